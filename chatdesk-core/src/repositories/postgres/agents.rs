use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use crate::Error;
use crate::models::{Agent, AgentAvailability};
pub use chatdesk_common::traits::repository_traits::AgentRepository;

#[derive(Clone)]
pub struct PostgresAgentRepository {
    pool: Pool<Postgres>,
}

impl PostgresAgentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn agent_from_row(row: &PgRow) -> Result<Agent, Error> {
    let availability: String = row.try_get("availability")?;
    Ok(Agent {
        agent_id: row.try_get("agent_id")?,
        display_name: row.try_get("display_name")?,
        availability: availability.parse::<AgentAvailability>()?,
        active_chat_count: row.try_get("active_chat_count")?,
        max_concurrent_chats: row.try_get("max_concurrent_chats")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn upsert_agent(&self, agent: &Agent) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO agents (
                agent_id, display_name, availability,
                active_chat_count, max_concurrent_chats, updated_at
            )
            VALUES ($1, $2, $3, 0, $4, $5)
            ON CONFLICT (agent_id) DO UPDATE
               SET display_name = EXCLUDED.display_name,
                   availability = EXCLUDED.availability,
                   max_concurrent_chats = EXCLUDED.max_concurrent_chats,
                   updated_at = EXCLUDED.updated_at
            "#,
        )
            .bind(&agent.agent_id)
            .bind(&agent.display_name)
            .bind(agent.availability.to_string())
            .bind(agent.max_concurrent_chats)
            .bind(agent.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, Error> {
        let row = sqlx::query(
            r#"
            SELECT agent_id, display_name, availability,
                   active_chat_count, max_concurrent_chats, updated_at
            FROM agents
            WHERE agent_id = $1
            "#,
        )
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(agent_from_row).transpose()
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT agent_id, display_name, availability,
                   active_chat_count, max_concurrent_chats, updated_at
            FROM agents
            ORDER BY agent_id ASC
            "#,
        )
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(agent_from_row).collect()
    }

    async fn set_availability(&self, agent_id: &str, availability: AgentAvailability) -> Result<bool, Error> {
        let result = sqlx::query(
            "UPDATE agents SET availability = $2, updated_at = NOW() WHERE agent_id = $1",
        )
            .bind(agent_id)
            .bind(availability.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_capacity(&self, agent_id: &str, max_concurrent_chats: i32) -> Result<bool, Error> {
        let result = sqlx::query(
            "UPDATE agents SET max_concurrent_chats = $2, updated_at = NOW() WHERE agent_id = $1",
        )
            .bind(agent_id)
            .bind(max_concurrent_chats)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reconcile_workload(&self) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE agents a
               SET active_chat_count = actual.cnt,
                   updated_at = NOW()
              FROM (
                    SELECT ag.agent_id, COUNT(cs.chat_id)::INTEGER AS cnt
                      FROM agents ag
                      LEFT JOIN chat_sessions cs
                        ON cs.assigned_agent_id = ag.agent_id
                       AND cs.status = 'assigned'
                     GROUP BY ag.agent_id
                   ) AS actual
             WHERE a.agent_id = actual.agent_id
               AND a.active_chat_count <> actual.cnt
            "#,
        )
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
