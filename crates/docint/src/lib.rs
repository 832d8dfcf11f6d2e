//! Document intelligence boundary - the external services the lifecycle
//! engine consumes, specified as traits and implemented here.
//!
//! - `order`: the purchase-order producer (structured payload + rendered
//!   document) invoked when a request reaches APPROVED
//! - `receipt`: text extraction from uploaded receipts and reconciliation of
//!   that text against the stored order content
//! - `blob`: file storage for receipts and rendered orders
//! - `llm`: the pluggable completion client behind the generative
//!   implementations
//!
//! # Safety principle
//!
//! The model is strictly a drafter and a comparer. It never decides order
//! totals, line items or vendor fields - those are copied verbatim from the
//! approved request by deterministic code. Reconciliation verdicts that come
//! back unparseable are errors, never silently treated as valid.

pub mod blob;
pub mod llm;
pub mod order;
pub mod receipt;

pub use blob::{BlobStore, FsBlobStore, InMemoryBlobStore};
pub use llm::{HttpLlmClient, LlmClient, StaticLlmClient};
pub use order::{
    DeterministicOrderProducer, LlmOrderProducer, OrderContext, OrderProducer,
    TemplateOrderRenderer,
};
pub use receipt::{
    LlmReceiptReconciler, ReceiptReconciler, RuleBasedReconciler, TextExtractor,
    Utf8TextExtractor,
};
