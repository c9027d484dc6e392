use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;
use crate::Error;
use crate::models::{ChatSession, ChatStatus};
pub use chatdesk_common::traits::repository_traits::ChatSessionRepository;

const CHAT_COLUMNS: &str = r#"
    chat_id, requester, category, status, created_at, last_message_at,
    assigned_agent_id, assigned_at, first_response_at, closed_at
"#;

#[derive(Clone)]
pub struct PostgresChatSessionRepository {
    pool: Pool<Postgres>,
}

impl PostgresChatSessionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

pub(crate) fn chat_from_row(row: &PgRow) -> Result<ChatSession, Error> {
    let status: String = row.try_get("status")?;
    Ok(ChatSession {
        chat_id: row.try_get("chat_id")?,
        requester: row.try_get("requester")?,
        category: row.try_get("category")?,
        status: status.parse::<ChatStatus>()?,
        created_at: row.try_get("created_at")?,
        last_message_at: row.try_get("last_message_at")?,
        assigned_agent_id: row.try_get("assigned_agent_id")?,
        assigned_at: row.try_get("assigned_at")?,
        first_response_at: row.try_get("first_response_at")?,
        closed_at: row.try_get("closed_at")?,
    })
}

#[async_trait]
impl ChatSessionRepository for PostgresChatSessionRepository {
    async fn insert_chat(&self, chat: &ChatSession) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO chat_sessions (
                chat_id, requester, category, status, created_at, last_message_at,
                assigned_agent_id, assigned_at, first_response_at, closed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
            .bind(chat.chat_id)
            .bind(&chat.requester)
            .bind(&chat.category)
            .bind(chat.status.to_string())
            .bind(chat.created_at)
            .bind(chat.last_message_at)
            .bind(&chat.assigned_agent_id)
            .bind(chat.assigned_at)
            .bind(chat.first_response_at)
            .bind(chat.closed_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_chat(&self, chat_id: Uuid) -> Result<Option<ChatSession>, Error> {
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chat_sessions WHERE chat_id = $1");
        let row = sqlx::query(&sql)
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(chat_from_row).transpose()
    }

    async fn list_by_status(&self, statuses: &[ChatStatus]) -> Result<Vec<ChatSession>, Error> {
        let wanted: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chat_sessions
             WHERE status = ANY($1)
             ORDER BY created_at ASC, chat_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(&wanted)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(chat_from_row).collect()
    }

    async fn list_assigned_to(&self, agent_id: &str) -> Result<Vec<ChatSession>, Error> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chat_sessions
             WHERE assigned_agent_id = $1 AND status = 'assigned'
             ORDER BY assigned_at DESC, chat_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(chat_from_row).collect()
    }

    async fn record_first_response(&self, chat_id: Uuid, at: DateTime<Utc>) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE chat_sessions
               SET first_response_at = $2,
                   last_message_at = GREATEST(last_message_at, $2)
             WHERE chat_id = $1
               AND first_response_at IS NULL
               AND status IN ('unassigned', 'assigned')
            "#,
        )
            .bind(chat_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_message(&self, chat_id: Uuid, at: DateTime<Utc>) -> Result<bool, Error> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET last_message_at = GREATEST(last_message_at, $2) WHERE chat_id = $1",
        )
            .bind(chat_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
