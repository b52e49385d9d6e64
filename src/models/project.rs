use serde::Serialize;

use crate::schema::field;
use crate::store::Document;

use super::{Fields, Identifier, Parsed};

pub const DEFAULT_CURRENCY: &str = "RD$";

/// A project document. Its key scopes every project sub-collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_account: Option<Identifier>,
    pub description: String,
}

impl Project {
    pub fn from_document(doc: &Document) -> Parsed<Self> {
        let id = doc.id.clone();
        Ok(Self {
            name: doc
                .text(field::NAME)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Proyecto {id}")),
            currency: doc
                .text(field::CURRENCY)
                .unwrap_or(DEFAULT_CURRENCY)
                .to_string(),
            primary_account: doc
                .field(field::PRIMARY_ACCOUNT)
                .and_then(Identifier::normalize),
            description: doc.text(field::DESCRIPTION).unwrap_or_default().to_string(),
            id,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub currency: Option<String>,
}

impl NewProject {
    pub fn to_fields(&self, now: chrono::DateTime<chrono::Utc>) -> Fields {
        crate::fields! {
            field::NAME => self.name.as_str(),
            field::DESCRIPTION => self.description.as_str(),
            field::CURRENCY => self.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
            field::ACTIVE => true,
            field::CREATED_AT => now,
            field::UPDATED_AT => now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn missing_fields_get_defaults() {
        let doc = Document::new("proyectos/10", fields! {});
        let project = Project::from_document(&doc).unwrap();
        assert_eq!(project.id, "10");
        assert_eq!(project.name, "Proyecto 10");
        assert_eq!(project.currency, "RD$");
        assert_eq!(project.primary_account, None);
    }

    #[test]
    fn primary_account_is_normalized() {
        let doc = Document::new(
            "proyectos/10",
            fields! { "nombre" => "Casa", "cuenta_principal" => "3", "moneda" => "USD" },
        );
        let project = Project::from_document(&doc).unwrap();
        assert_eq!(project.primary_account, Some(Identifier::Numeric(3)));
        assert_eq!(project.currency, "USD");
    }
}
