//! The request lifecycle engine: the core-exposed operations of the
//! procurement workflow, orchestrating the pure core, the persistence layer
//! and the document-intelligence boundary.
//!
//! Every operation takes an [`Actor`](procura_core::Actor) and returns
//! either a success payload or an [`EngineError`] with a stable `kind()`
//! tag. External calls (order generation, text extraction, receipt
//! reconciliation, file storage) run synchronously in the call path under a
//! bounded timeout; their failures surface as `external_service` errors and
//! are never swallowed.

mod errors;
mod service;

pub use errors::EngineError;
pub use service::{
    BackfillReport, DecisionSummary, EngineDeps, LifecycleEngine, NewRequestInput, ReceiptUpload,
    RequestDetail, UpdateRequestInput,
};
