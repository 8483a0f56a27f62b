//! Service catalog: the registry incidents and SLOs hang off.

mod model;
mod repository;

pub use model::{CreateServiceRequest, Service};
pub use repository::ServiceRepository;
