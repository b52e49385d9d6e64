//! Persisted layout shared with the desktop client.
//!
//! Collection and field names are part of the external contract: records are
//! read and written by other tools, so these strings must not change.

pub const PROJECTS: &str = "proyectos";
pub const ACCOUNTS: &str = "cuentas";
pub const CATEGORIES: &str = "categorias";
pub const SUBCATEGORIES: &str = "subcategorias";

pub const TRANSACTIONS: &str = "transacciones";
pub const CATEGORY_BUDGETS: &str = "presupuestos";
pub const SUBCATEGORY_BUDGETS: &str = "presupuestos_subcategorias";
pub const ACCOUNT_LINKS: &str = "cuentas_proyecto";
pub const CATEGORY_LINKS: &str = "categorias_proyecto";
pub const SUBCATEGORY_LINKS: &str = "subcategorias_proyecto";

/// Path of a sub-collection owned by a project document.
pub fn project_collection(project_id: &str, collection: &str) -> String {
    format!("{PROJECTS}/{project_id}/{collection}")
}

pub fn transactions_of(project_id: &str) -> String {
    project_collection(project_id, TRANSACTIONS)
}

pub mod field {
    pub const ID: &str = "id";
    pub const NAME: &str = "nombre";
    pub const DESCRIPTION: &str = "descripcion";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";

    // proyectos
    pub const CURRENCY: &str = "moneda";
    pub const PRIMARY_ACCOUNT: &str = "cuenta_principal";

    // cuentas
    pub const ACCOUNT_TYPE: &str = "tipo";
    pub const ACCOUNT_SUB_TYPE: &str = "tipo_cuenta";

    // subcategorias, subcategory links and budgets
    pub const CATEGORY_ID: &str = "categoria_id";

    // transacciones
    pub const DATE: &str = "fecha";
    pub const KIND: &str = "tipo";
    pub const ACCOUNT_ID: &str = "cuenta_id";
    pub const SUBCATEGORY_ID: &str = "subcategoria_id";
    pub const AMOUNT: &str = "monto";
    pub const COMMENT: &str = "comentario";
    pub const IS_TRANSFER: &str = "es_transferencia";
    pub const LINKED_TRANSFER: &str = "transferencia_vinculada_id";
    pub const ACTIVE: &str = "activo";
    pub const REMOVED: &str = "eliminado";
    pub const DELETED: &str = "deleted";
    pub const DELETED_AT: &str = "fecha_eliminacion";
    pub const MODIFIED_AT: &str = "fecha_modificacion";
    pub const ATTACHMENT_PATHS: &str = "adjuntos_paths";
    pub const LEGACY_ATTACHMENTS: &str = "adjuntos";
    pub const LEGACY_ATTACHMENTS_EN: &str = "attachments";
    pub const PROJECT_ID: &str = "proyecto_id";
    pub const CATEGORY_NAME: &str = "categoriaNombre";
    pub const SUBCATEGORY_NAME: &str = "subcategoriaNombre";
    pub const ACCOUNT_NAME: &str = "cuentaNombre";

    // *_proyecto links
    pub const LINK_ACTIVE: &str = "activa";
    pub const MASTER_ACCOUNT_ID: &str = "cuenta_maestra_id";
    pub const MASTER_CATEGORY_ID: &str = "categoria_maestra_id";
    pub const MASTER_SUBCATEGORY_ID: &str = "subcategoria_maestra_id";
    pub const LINK_ACCOUNT_NAME: &str = "cuenta_nombre";
    pub const PRINCIPAL: &str = "principal";
    pub const IS_PRINCIPAL: &str = "is_principal";

    // presupuestos
    pub const PERIOD_START: &str = "fecha_inicio";
    pub const PERIOD_END: &str = "fecha_fin";
    pub const NOTES: &str = "observaciones";
    pub const BUDGET_CATEGORY_NAME: &str = "categoria_nombre";
    pub const BUDGET_SUBCATEGORY_NAME: &str = "subcategoria_nombre";
}

/// Stored spellings of the transaction kinds.
pub mod kind {
    pub const INCOME: &str = "ingreso";
    pub const EXPENSE: &str = "gasto";
    pub const INCOME_TITLE: &str = "Ingreso";
    pub const EXPENSE_TITLE: &str = "Gasto";
}

/// Text written into transfer legs. Descriptions referencing an account that
/// could not be named use `Cuenta <id>`, which readers later rewrite.
pub mod transfer_text {
    pub const TO: &str = "Transferencia a";
    pub const FROM: &str = "Transferencia desde";
    pub const DEFAULT_COMMENT: &str = "Transferencia automática";
    pub const MARKER: &str = "Transferencia";
    pub const UNNAMED_ACCOUNT: &str = "Cuenta";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_collections_nest_under_the_project_document() {
        assert_eq!(transactions_of("10"), "proyectos/10/transacciones");
        assert_eq!(
            project_collection("10", CATEGORY_LINKS),
            "proyectos/10/categorias_proyecto"
        );
    }
}
