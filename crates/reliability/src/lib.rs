//! # Reliability Domain
//!
//! The service catalog, SLO definitions and evaluator, incident records, and
//! the per-incident correlation engine with its telemetry adapters.

pub mod correlation;
pub mod incident;
pub mod services;
pub mod slo;
pub mod telemetry;

pub use correlation::{CorrelationEngine, CorrelationRequest, IncidentContext};
pub use incident::IncidentRepository;
pub use services::ServiceRepository;
pub use slo::{SloEvaluator, SloRepository};
pub use telemetry::Telemetry;
