use async_trait::async_trait;
use chrono::Duration;
use sqlx::{Pool, Postgres, Row};
use crate::Error;
use crate::models::{SlaPolicy, SlaPolicySet};
use crate::models::sla::GLOBAL_SCOPE;
pub use chatdesk_common::traits::repository_traits::SlaPolicyRepository;

#[derive(Clone)]
pub struct PostgresSlaPolicyRepository {
    pool: Pool<Postgres>,
}

impl PostgresSlaPolicyRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SlaPolicyRepository for PostgresSlaPolicyRepository {
    async fn upsert_policy(&self, policy: &SlaPolicy) -> Result<(), Error> {
        if policy.first_response_threshold <= Duration::zero() || policy.resolution_threshold <= Duration::zero() {
            return Err(Error::Configuration(format!(
                "SLA thresholds for scope '{}' must be positive",
                policy.scope()
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO sla_policies (scope, first_response_secs, resolution_secs, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (scope) DO UPDATE
               SET first_response_secs = EXCLUDED.first_response_secs,
                   resolution_secs = EXCLUDED.resolution_secs,
                   updated_at = NOW()
            "#,
        )
            .bind(policy.scope())
            .bind(policy.first_response_threshold.num_seconds())
            .bind(policy.resolution_threshold.num_seconds())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load_policies(&self) -> Result<SlaPolicySet, Error> {
        let rows = sqlx::query("SELECT scope, first_response_secs, resolution_secs FROM sla_policies")
            .fetch_all(&self.pool)
            .await?;

        let mut set = SlaPolicySet::default();
        for row in rows {
            let scope: String = row.try_get("scope")?;
            let first_response_secs: i64 = row.try_get("first_response_secs")?;
            let resolution_secs: i64 = row.try_get("resolution_secs")?;
            set.insert(SlaPolicy {
                category: (scope != GLOBAL_SCOPE).then_some(scope),
                first_response_threshold: Duration::seconds(first_response_secs),
                resolution_threshold: Duration::seconds(resolution_secs),
            });
        }
        Ok(set)
    }
}
