use super::model::{CreateServiceRequest, Service};
use sqlx::PgPool;
use uuid::Uuid;
use vigil_core::Result;

#[derive(Clone)]
pub struct ServiceRepository {
    pool: PgPool,
}

impl ServiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>("SELECT * FROM services ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(services)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Service>> {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(service)
    }

    pub async fn create(&self, request: &CreateServiceRequest) -> Result<Service> {
        let service = sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (name, description, owner_team, labels)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(request.name.trim())
        .bind(&request.description)
        .bind(&request.owner_team)
        .bind(request.labels.clone().unwrap_or_else(|| serde_json::json!({})))
        .fetch_one(&self.pool)
        .await?;
        Ok(service)
    }

    /// Returns the service with this name, creating it when an incident
    /// references a service that was never declared.
    pub async fn upsert_by_name(&self, name: &str) -> Result<Service> {
        let service = sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (name)
            VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(name.trim())
        .fetch_one(&self.pool)
        .await?;
        Ok(service)
    }
}
