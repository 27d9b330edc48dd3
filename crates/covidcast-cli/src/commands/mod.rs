pub mod format;
pub mod plan;
pub mod revisions;
pub mod sync;
