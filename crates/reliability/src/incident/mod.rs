//! Incidents, their timeline, and persisted correlations.

mod model;
mod repository;

pub use model::{
    CorrelationRecord, CreateCommentRequest, CreateIncidentRequest, Incident,
    IncidentWithService, NewTimelineEvent, Severity, TimelineEvent, UpdateIncidentRequest,
    INCIDENT_SEVERITIES, INCIDENT_STATUSES,
};
pub use repository::IncidentRepository;
