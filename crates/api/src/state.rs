use std::sync::Arc;
use vigil_auth::AuthService;
use vigil_core::{AuditLogger, Config, DatabasePool};
use vigil_reliability::{
    CorrelationEngine, IncidentRepository, ServiceRepository, SloEvaluator, SloRepository,
    Telemetry,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DatabasePool,
    pub telemetry: Telemetry,
    pub audit: AuditLogger,
    pub auth_service: Arc<AuthService>,
    pub incidents: IncidentRepository,
    pub services: ServiceRepository,
    pub slos: SloRepository,
    pub engine: CorrelationEngine,
    pub evaluator: Arc<SloEvaluator>,
}
