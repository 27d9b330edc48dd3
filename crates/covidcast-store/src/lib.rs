pub mod ledger;
pub mod objects;
mod schema;

pub use ledger::RevisionLedger;
pub use objects::SqliteObjectStore;
