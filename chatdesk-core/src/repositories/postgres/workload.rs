// src/repositories/postgres/workload.rs
//
// Chat status and agent counters change together, inside one transaction,
// or not at all. Every UPDATE carries the state it was decided on; zero rows
// affected means someone else got there first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;
use crate::Error;
use crate::models::ChatStatus;
pub use chatdesk_common::traits::repository_traits::WorkloadStore;

#[derive(Clone)]
pub struct PostgresWorkloadStore {
    pool: Pool<Postgres>,
}

impl PostgresWorkloadStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn lost(what: String) -> Error {
    Error::ConcurrentModification(what)
}

#[async_trait]
impl WorkloadStore for PostgresWorkloadStore {
    async fn claim_chat(
        &self,
        chat_id: Uuid,
        agent_id: &str,
        expected_count: i32,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        let chat = sqlx::query(
            r#"
            UPDATE chat_sessions
               SET status = 'assigned', assigned_agent_id = $2, assigned_at = $3
             WHERE chat_id = $1 AND status = 'unassigned'
            "#,
        )
            .bind(chat_id)
            .bind(agent_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        if chat.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(lost(format!("chat {} is no longer unassigned", chat_id)));
        }

        let agent = sqlx::query(
            r#"
            UPDATE agents
               SET active_chat_count = active_chat_count + 1, updated_at = $3
             WHERE agent_id = $1
               AND active_chat_count = $2
               AND active_chat_count < max_concurrent_chats
               AND availability = 'online'
            "#,
        )
            .bind(agent_id)
            .bind(expected_count)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        if agent.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(lost(format!(
                "agent {} changed since it was read with {} active chats",
                agent_id, expected_count
            )));
        }

        tx.commit().await?;
        debug!(%chat_id, agent_id, "chat claimed");
        Ok(())
    }

    async fn transfer_chat(
        &self,
        chat_id: Uuid,
        from_agent_id: &str,
        from_expected_count: i32,
        to_agent_id: &str,
        to_expected_count: i32,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        let chat = sqlx::query(
            r#"
            UPDATE chat_sessions
               SET assigned_agent_id = $3, assigned_at = $4
             WHERE chat_id = $1
               AND status = 'assigned'
               AND assigned_agent_id = $2
               AND first_response_at IS NULL
            "#,
        )
            .bind(chat_id)
            .bind(from_agent_id)
            .bind(to_agent_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        if chat.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(lost(format!("chat {} can no longer move off {}", chat_id, from_agent_id)));
        }

        let donor = sqlx::query(
            r#"
            UPDATE agents
               SET active_chat_count = active_chat_count - 1, updated_at = $3
             WHERE agent_id = $1 AND active_chat_count = $2 AND active_chat_count > 0
            "#,
        )
            .bind(from_agent_id)
            .bind(from_expected_count)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        if donor.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(lost(format!("donor {} workload changed", from_agent_id)));
        }

        let recipient = sqlx::query(
            r#"
            UPDATE agents
               SET active_chat_count = active_chat_count + 1, updated_at = $3
             WHERE agent_id = $1
               AND active_chat_count = $2
               AND active_chat_count < max_concurrent_chats
               AND availability = 'online'
            "#,
        )
            .bind(to_agent_id)
            .bind(to_expected_count)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        if recipient.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(lost(format!("recipient {} workload changed", to_agent_id)));
        }

        tx.commit().await?;
        debug!(%chat_id, from_agent_id, to_agent_id, "chat transferred");
        Ok(())
    }

    async fn requeue_chat(&self, chat_id: Uuid, agent_id: &str) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        let chat = sqlx::query(
            r#"
            UPDATE chat_sessions
               SET status = 'unassigned', assigned_agent_id = NULL, assigned_at = NULL
             WHERE chat_id = $1
               AND status = 'assigned'
               AND assigned_agent_id = $2
               AND first_response_at IS NULL
            "#,
        )
            .bind(chat_id)
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;

        if chat.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(lost(format!("chat {} can no longer be requeued from {}", chat_id, agent_id)));
        }

        sqlx::query(
            r#"
            UPDATE agents
               SET active_chat_count = GREATEST(active_chat_count - 1, 0), updated_at = NOW()
             WHERE agent_id = $1
            "#,
        )
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn finish_chat(
        &self,
        chat_id: Uuid,
        outcome: ChatStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<String>, Error> {
        if outcome.is_open() {
            return Err(Error::InvalidState(format!("{} is not a terminal chat status", outcome)));
        }

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT status, assigned_agent_id
              FROM chat_sessions
             WHERE chat_id = $1 AND status IN ('unassigned', 'assigned')
               FOR UPDATE
            "#,
        )
            .bind(chat_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(lost(format!("chat {} is not open", chat_id)));
        };

        let prev_status: String = row.try_get("status")?;
        let prev_agent: Option<String> = row.try_get("assigned_agent_id")?;

        sqlx::query("UPDATE chat_sessions SET status = $2, closed_at = $3 WHERE chat_id = $1")
            .bind(chat_id)
            .bind(outcome.to_string())
            .bind(at)
            .execute(&mut *tx)
            .await?;

        let released = match (prev_status.parse::<ChatStatus>()?, prev_agent) {
            (ChatStatus::Assigned, Some(agent_id)) => {
                sqlx::query(
                    r#"
                    UPDATE agents
                       SET active_chat_count = GREATEST(active_chat_count - 1, 0), updated_at = $2
                     WHERE agent_id = $1
                    "#,
                )
                    .bind(&agent_id)
                    .bind(at)
                    .execute(&mut *tx)
                    .await?;
                Some(agent_id)
            }
            _ => None,
        };

        tx.commit().await?;
        Ok(released)
    }
}
