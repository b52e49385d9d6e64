mod budget;
mod catalog;
mod id;
mod id_generator;
mod link;
mod project;
mod record;
mod transaction;

pub use budget::{Budget, BudgetEntry, BudgetPeriod, BudgetTarget};
pub use catalog::{next_numeric_id, CatalogKind, CatalogRecord};
pub use id::{Identifier, IdentifierError};
pub use id_generator::{FixedIdGenerator, IdGenerator, UuidIdGenerator};
pub use link::LinkRecord;
pub use project::{NewProject, Project};
pub use record::{FieldValue, Fields, Parsed, SkipReason};
pub use transaction::{
    format_date, is_live, NewTransaction, Transaction, TransactionPatch, TransactionType,
    TransferRequest,
};
