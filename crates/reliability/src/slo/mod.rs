//! SLO definitions, persistence, and the periodic evaluator.

mod evaluator;
mod model;
mod repository;

pub use evaluator::{
    classify_budget, compute_error_budget, substitute_window, SloEvaluator,
};
pub use model::{
    CreateSloRequest, Slo, SloCalculation, UpdateSloRequest, STATUS_CRITICAL, STATUS_DISABLED,
    STATUS_HEALTHY, STATUS_WARNING, WINDOW_TOKEN,
};
pub use repository::SloRepository;
