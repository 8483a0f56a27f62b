//! Per-incident correlation: concurrent telemetry fan-out, scoring, root
//! cause ranking, and transactional persistence of the results.

mod context;
mod engine;

pub use context::{
    CorrelationRequest, CorrelationType, Finding, IncidentContext, SourceType,
};
pub use engine::{CorrelationEngine, CorrelationStore, MAX_CONCURRENT_CORRELATIONS};
