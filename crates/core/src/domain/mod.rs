pub mod actor;
pub mod approval;
pub mod item;
pub mod order;
pub mod receipt;
pub mod request;

use serde::{Deserialize, Serialize};

/// Opaque reference to a stored file (proforma, receipt, rendered order).
/// The blob store hands these out; the core never interprets them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRef(pub String);
