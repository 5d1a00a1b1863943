// Database module
// The relational document store, the per-collection vector index, and the
// reconciliation pass that keeps the two artifacts consistent.

pub mod consistency;
pub mod sqlite;
pub mod vector;

pub use consistency::{ConsistencyReport, check_consistency, reconcile};
pub use sqlite::{DocumentStore, NewDocument};
pub use vector::{VectorStore, normalize};
