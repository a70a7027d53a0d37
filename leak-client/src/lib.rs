pub mod db;
pub mod domain;
pub mod error;

pub use db::{InsertOutcome, QueryResult, Store};
pub use error::{IntegrityKind, StoreError};
