use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;
use crate::Error;
use crate::models::{BreachType, SlaBreachEvent};
pub use chatdesk_common::traits::repository_traits::SlaBreachRepository;

/// Append-only breach log keyed by `(chat_id, breach_type)`.
#[derive(Clone)]
pub struct PostgresSlaBreachRepository {
    pool: Pool<Postgres>,
}

impl PostgresSlaBreachRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn breach_from_row(row: &PgRow) -> Result<SlaBreachEvent, Error> {
    let breach_type: String = row.try_get("breach_type")?;
    Ok(SlaBreachEvent {
        chat_id: row.try_get("chat_id")?,
        breach_type: breach_type.parse::<BreachType>()?,
        detected_at: row.try_get("detected_at")?,
        notified: row.try_get("notified")?,
    })
}

#[async_trait]
impl SlaBreachRepository for PostgresSlaBreachRepository {
    async fn record_breach(&self, event: &SlaBreachEvent) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO sla_breach_events (chat_id, breach_type, detected_at, notified)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (chat_id, breach_type) DO NOTHING
            "#,
        )
            .bind(event.chat_id)
            .bind(event.breach_type.to_string())
            .bind(event.detected_at)
            .bind(event.notified)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_notification(
        &self,
        chat_id: Uuid,
        breach_type: BreachType,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE sla_breach_events
               SET claimed_at = $3
             WHERE chat_id = $1 AND breach_type = $2 AND notified = FALSE
               AND (claimed_at IS NULL OR claimed_at <= $4)
            "#,
        )
            .bind(chat_id)
            .bind(breach_type.to_string())
            .bind(now)
            .bind(now - lease)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_notification(&self, chat_id: Uuid, breach_type: BreachType, at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE sla_breach_events
               SET notified = TRUE, notified_at = $3, claimed_at = NULL
             WHERE chat_id = $1 AND breach_type = $2
            "#,
        )
            .bind(chat_id)
            .bind(breach_type.to_string())
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn release_notification(&self, chat_id: Uuid, breach_type: BreachType) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE sla_breach_events
               SET claimed_at = NULL
             WHERE chat_id = $1 AND breach_type = $2 AND notified = FALSE
            "#,
        )
            .bind(chat_id)
            .bind(breach_type.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_unnotified(&self) -> Result<Vec<SlaBreachEvent>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT chat_id, breach_type, detected_at, notified
            FROM sla_breach_events
            WHERE notified = FALSE
            ORDER BY detected_at ASC, chat_id ASC, breach_type ASC
            "#,
        )
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(breach_from_row).collect()
    }

    async fn list_for_chat(&self, chat_id: Uuid) -> Result<Vec<SlaBreachEvent>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT chat_id, breach_type, detected_at, notified
            FROM sla_breach_events
            WHERE chat_id = $1
            ORDER BY detected_at ASC, breach_type ASC
            "#,
        )
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(breach_from_row).collect()
    }
}
