pub mod aggregate;
pub mod app;
pub mod budgets;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod links;
pub mod migrate;
pub mod models;
pub mod projects;
pub mod schema;
pub mod session;
pub mod store;
pub mod transactions;

pub use error::{Error, Result};
pub use session::Session;
