use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::json;
use vigil_reliability::telemetry::AdapterHealth;

/// Overall, per-adapter, and database health. Always answers 200; degraded
/// components are flagged in the body.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (database, metrics, logs, orchestrator) = tokio::join!(
        state.db.check_health(),
        state.telemetry.metrics_health(),
        state.telemetry.logs_health(),
        state.telemetry.orchestrator_health(),
    );

    let database = if database.is_ok() { "up" } else { "down" };
    let degraded = database == "down"
        || metrics == AdapterHealth::Down
        || logs == AdapterHealth::Down
        || orchestrator == AdapterHealth::Down;

    Json(json!({
        "status": if degraded { "degraded" } else { "ok" },
        "components": {
            "database": database,
            "metrics": metrics,
            "logs": logs,
            "kubernetes": orchestrator,
        }
    }))
}
