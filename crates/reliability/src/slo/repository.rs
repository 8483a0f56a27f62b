use super::model::{CreateSloRequest, Slo, SloCalculation, UpdateSloRequest, STATUS_DISABLED};
use sqlx::PgPool;
use uuid::Uuid;
use vigil_core::{Error, Result};

#[derive(Clone)]
pub struct SloRepository {
    pool: PgPool,
}

impl SloRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Slo>> {
        let slos = sqlx::query_as::<_, Slo>("SELECT * FROM slos ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(slos)
    }

    pub async fn list_enabled(&self) -> Result<Vec<Slo>> {
        let slos = sqlx::query_as::<_, Slo>(
            "SELECT * FROM slos WHERE status <> $1 ORDER BY created_at",
        )
        .bind(STATUS_DISABLED)
        .fetch_all(&self.pool)
        .await?;
        Ok(slos)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Slo>> {
        let slo = sqlx::query_as::<_, Slo>("SELECT * FROM slos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(slo)
    }

    pub async fn create(&self, request: &CreateSloRequest) -> Result<Slo> {
        let slo = sqlx::query_as::<_, Slo>(
            r#"
            INSERT INTO slos
                (service_id, name, description, target_percentage, window_days, sli_type, query)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(request.service_id)
        .bind(request.name.trim())
        .bind(&request.description)
        .bind(request.target_percentage)
        .bind(request.window_days)
        .bind(&request.sli_type)
        .bind(&request.query)
        .fetch_one(&self.pool)
        .await?;
        Ok(slo)
    }

    pub async fn update(&self, id: Uuid, request: &UpdateSloRequest) -> Result<Option<Slo>> {
        if let Some(target) = request.target_percentage {
            if target <= 0.0 || target > 100.0 {
                return Err(Error::validation("target_percentage must be in (0, 100]"));
            }
        }
        if let Some(days) = request.window_days {
            if days < 1 {
                return Err(Error::validation("window_days must be at least 1"));
            }
        }

        let slo = sqlx::query_as::<_, Slo>(
            r#"
            UPDATE slos SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                target_percentage = COALESCE($4, target_percentage),
                window_days = COALESCE($5, window_days),
                sli_type = COALESCE($6, sli_type),
                query = COALESCE($7, query),
                status = COALESCE($8, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.name.as_deref().map(str::trim))
        .bind(&request.description)
        .bind(request.target_percentage)
        .bind(request.window_days)
        .bind(&request.sli_type)
        .bind(&request.query)
        .bind(&request.status)
        .fetch_optional(&self.pool)
        .await?;
        Ok(slo)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM slos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrites the calculated fields after a successful evaluation. A
    /// failed evaluation never reaches this point, leaving prior values
    /// intact.
    pub async fn record_calculation(
        &self,
        id: Uuid,
        calculation: SloCalculation,
        status: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE slos SET
                current_percentage = $2,
                error_budget_remaining = $3,
                status = $4,
                last_calculated_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(calculation.current_percentage)
        .bind(calculation.error_budget_remaining)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
