use std::fmt;

use serde::Serialize;

use crate::schema::{self, field};
use crate::store::Document;

use super::{FieldValue, Identifier, Parsed, SkipReason};

/// The three global catalogs shared by every project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Accounts,
    Categories,
    Subcategories,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 3] = [
        CatalogKind::Accounts,
        CatalogKind::Categories,
        CatalogKind::Subcategories,
    ];

    /// Top-level catalog collection.
    pub fn collection(self) -> &'static str {
        match self {
            CatalogKind::Accounts => schema::ACCOUNTS,
            CatalogKind::Categories => schema::CATEGORIES,
            CatalogKind::Subcategories => schema::SUBCATEGORIES,
        }
    }

    /// Per-project association sub-collection.
    pub fn link_collection(self) -> &'static str {
        match self {
            CatalogKind::Accounts => schema::ACCOUNT_LINKS,
            CatalogKind::Categories => schema::CATEGORY_LINKS,
            CatalogKind::Subcategories => schema::SUBCATEGORY_LINKS,
        }
    }

    /// Fields of an association record that may carry the catalog id, in
    /// priority order. The document key is the last resort.
    pub fn link_id_fields(self) -> &'static [&'static str] {
        match self {
            CatalogKind::Accounts => &[field::ACCOUNT_ID, field::MASTER_ACCOUNT_ID],
            CatalogKind::Categories => &[field::MASTER_CATEGORY_ID, field::CATEGORY_ID],
            CatalogKind::Subcategories => {
                &[field::MASTER_SUBCATEGORY_ID, field::SUBCATEGORY_ID]
            }
        }
    }

    /// Singular label used in placeholder names.
    pub fn label(self) -> &'static str {
        match self {
            CatalogKind::Accounts => "Account",
            CatalogKind::Categories => "Category",
            CatalogKind::Subcategories => "Subcategory",
        }
    }

    /// Display name for an id with no catalog record: `"<Kind> <id>"`.
    pub fn placeholder(self, id: &Identifier) -> String {
        format!("{} {id}", self.label())
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "accounts" | "account" | "cuentas" => Some(CatalogKind::Accounts),
            "categories" | "category" | "categorias" => Some(CatalogKind::Categories),
            "subcategories" | "subcategory" | "subcategorias" => {
                Some(CatalogKind::Subcategories)
            }
            _ => None,
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// One catalog entry (account, category or subcategory).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRecord {
    pub kind: CatalogKind,
    pub id: Identifier,
    /// Key of the backing document; differs from `id` for numeric ids.
    pub doc_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_sub_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_category_id: Option<Identifier>,
}

impl CatalogRecord {
    /// Parse a catalog document. The `id` field wins over the document key;
    /// records with neither usable are skipped.
    pub fn from_document(kind: CatalogKind, doc: &Document) -> Parsed<Self> {
        let id = doc
            .field(field::ID)
            .and_then(Identifier::normalize)
            .or_else(|| Identifier::parse(&doc.id))
            .ok_or(SkipReason::MissingField(field::ID))?;

        let name = doc
            .text(field::NAME)
            .map(str::to_string)
            .unwrap_or_else(|| kind.placeholder(&id));

        let (account_type, account_sub_type, parent_category_id) = match kind {
            CatalogKind::Accounts => (
                doc.text(field::ACCOUNT_TYPE).map(str::to_string),
                doc.text(field::ACCOUNT_SUB_TYPE).map(str::to_string),
                None,
            ),
            CatalogKind::Categories => (None, None, None),
            CatalogKind::Subcategories => (
                None,
                None,
                doc.field(field::CATEGORY_ID).and_then(Identifier::normalize),
            ),
        };

        Ok(Self {
            kind,
            id,
            doc_id: doc.id.clone(),
            name,
            account_type,
            account_sub_type,
            parent_category_id,
        })
    }
}

/// Next numeric id for a catalog: one past the largest numeric id in use.
pub fn next_numeric_id<'a>(ids: impl IntoIterator<Item = &'a FieldValue>) -> i64 {
    ids.into_iter()
        .filter_map(Identifier::normalize)
        .filter_map(|id| id.as_i64())
        .max()
        .unwrap_or(0)
        .max(0)
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn id_field_takes_priority_over_document_key() {
        let doc = Document::new("categorias/abcKey", fields! { "id" => 7, "nombre" => "Labor" });
        let rec = CatalogRecord::from_document(CatalogKind::Categories, &doc).unwrap();
        assert_eq!(rec.id, Identifier::Numeric(7));
        assert_eq!(rec.doc_id, "abcKey");
        assert_eq!(rec.name, "Labor");
    }

    #[test]
    fn document_key_is_the_fallback_id() {
        let doc = Document::new("subcategorias/K3y", fields! { "categoria_id" => "4" });
        let rec = CatalogRecord::from_document(CatalogKind::Subcategories, &doc).unwrap();
        assert_eq!(rec.id, Identifier::Opaque("K3y".to_string()));
        assert_eq!(rec.name, "Subcategory K3y");
        assert_eq!(rec.parent_category_id, Some(Identifier::Numeric(4)));
    }

    #[test]
    fn next_numeric_id_ignores_opaque_values() {
        let values = [
            FieldValue::Integer(3),
            FieldValue::from("11"),
            FieldValue::from("legacy"),
        ];
        assert_eq!(next_numeric_id(values.iter()), 12);
        assert_eq!(next_numeric_id(std::iter::empty()), 1);
    }
}
