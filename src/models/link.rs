use serde::Serialize;

use crate::schema::field;
use crate::store::Document;

use super::{CatalogKind, Identifier, Parsed, SkipReason};

/// A raw `*_proyecto` association document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRecord {
    pub kind: CatalogKind,
    pub doc_id: String,
    /// Catalog entry this association points at.
    pub catalog_id: Identifier,
    pub active: bool,
    /// Accounts only: marked as the project's main account.
    pub principal: bool,
    /// Subcategories only: parent category copied in at assignment time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Identifier>,
}

impl LinkRecord {
    /// Pick the catalog id from the first usable id field, skipping blanks and
    /// the zero placeholder older writers left behind, then the document key.
    pub fn from_document(kind: CatalogKind, doc: &Document) -> Parsed<Self> {
        let catalog_id = kind
            .link_id_fields()
            .iter()
            .filter_map(|name| doc.field(name))
            .filter(|raw| raw.truthy())
            .filter_map(Identifier::normalize)
            .find(|id| !id.is_sentinel_zero())
            .or_else(|| Identifier::parse(&doc.id))
            .ok_or(SkipReason::MissingField(kind.link_id_fields()[0]))?;

        let principal = kind == CatalogKind::Accounts
            && (doc.flag(field::PRINCIPAL, false) || doc.flag(field::IS_PRINCIPAL, false));

        let category_id = match kind {
            CatalogKind::Subcategories => doc
                .field(field::CATEGORY_ID)
                .and_then(Identifier::normalize),
            _ => None,
        };

        Ok(Self {
            kind,
            doc_id: doc.id.clone(),
            catalog_id,
            active: doc.flag(field::LINK_ACTIVE, true),
            principal,
            category_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn master_id_field_wins_for_categories() {
        let doc = Document::new(
            "proyectos/1/categorias_proyecto/k1",
            fields! { "categoria_maestra_id" => "9", "categoria_id" => 4 },
        );
        let link = LinkRecord::from_document(CatalogKind::Categories, &doc).unwrap();
        assert_eq!(link.catalog_id, Identifier::Numeric(9));
        assert!(link.active);
    }

    #[test]
    fn zero_and_blank_ids_fall_through() {
        let doc = Document::new(
            "proyectos/1/subcategorias_proyecto/33",
            fields! { "subcategoria_maestra_id" => 0, "subcategoria_id" => "", "activa" => false },
        );
        let link = LinkRecord::from_document(CatalogKind::Subcategories, &doc).unwrap();
        assert_eq!(link.catalog_id, Identifier::Numeric(33));
        assert!(!link.active);
    }

    #[test]
    fn account_links_read_either_principal_flag() {
        let doc = Document::new(
            "proyectos/1/cuentas_proyecto/x",
            fields! { "cuenta_id" => 2, "is_principal" => true },
        );
        let link = LinkRecord::from_document(CatalogKind::Accounts, &doc).unwrap();
        assert_eq!(link.catalog_id, Identifier::Numeric(2));
        assert!(link.principal);
    }
}
