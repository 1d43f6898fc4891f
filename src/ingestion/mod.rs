//! Reading incoming files.
//!
//! - [`retry`]: bounded wait until a new file can be opened
//! - [`unified`]: [`SheetExtractor`], dispatching on extension to
//! - [`excel`] (calamine) or [`csv`] (pass-through)
//! - [`observability`]: pipeline events and the observers that record them

pub mod csv;
pub mod excel;
pub mod observability;
pub mod retry;
pub mod unified;

pub use observability::{
    CompositeObserver, FileObserver, PipelineEvent, PipelineObserver, Severity, TracingObserver,
};
pub use retry::{wait_until_readable, Readiness, RetryGate};
pub use unified::{InputFormat, SheetExtractor};
