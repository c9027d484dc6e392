// File: chatdesk-core/src/test_utils/helpers.rs

use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Connection, PgConnection, Pool, Postgres};
use sqlx::postgres::PgPoolOptions;

use chatdesk_common::traits::notifier_traits::DeskNotifier;
use crate::Error;
use crate::db::Database;
use crate::eventbus::{EventBus, EventBusNotifier};
use crate::models::{Agent, AgentAvailability, ChatSession, SchedulerConfig, SlaPolicy};
use crate::repositories::MemoryDeskStore;
use crate::services::{DeskServices, DeskStores};

/// A complete desk over the in-memory store.
pub struct MemoryDesk {
    pub store: MemoryDeskStore,
    pub bus: EventBus,
    pub desk: DeskServices,
}

/// In-memory desk whose notifier publishes to an event bus.
pub fn memory_desk(config: SchedulerConfig) -> MemoryDesk {
    let bus = EventBus::new();
    let notifier: Arc<dyn DeskNotifier> = Arc::new(EventBusNotifier::new(bus.clone()));
    let store = MemoryDeskStore::new();
    let desk = DeskServices::new(DeskStores::memory(&store), notifier, config);
    MemoryDesk { store, bus, desk }
}

pub fn memory_desk_with_notifier(config: SchedulerConfig, notifier: Arc<dyn DeskNotifier>) -> MemoryDesk {
    let store = MemoryDeskStore::new();
    let desk = DeskServices::new(DeskStores::memory(&store), notifier, config);
    MemoryDesk {
        store,
        bus: EventBus::new(),
        desk,
    }
}

pub async fn add_online_agent(desk: &DeskServices, agent_id: &str, max: i32) -> Result<Agent, Error> {
    desk.registry
        .register_agent(agent_id, agent_id, max, AgentAvailability::Online)
        .await
}

pub async fn add_chat_at(
    desk: &DeskServices,
    created_at: DateTime<Utc>,
    category: Option<&str>,
) -> Result<ChatSession, Error> {
    desk.queue.enqueue(ChatSession::new("member", category, created_at)).await
}

/// Queues `count` chats one second apart starting at `start` and assigns them
/// all to `agent_id`, one by one.
pub async fn give_chats(
    desk: &DeskServices,
    agent_id: &str,
    start: DateTime<Utc>,
    count: usize,
) -> Result<Vec<ChatSession>, Error> {
    let mut chats = Vec::with_capacity(count);
    for i in 0..count {
        let at = start + Duration::seconds(i as i64);
        let chat = add_chat_at(desk, at, None).await?;
        desk.assignment.assign_chat_to(chat.chat_id, agent_id, at).await?;
        chats.push(desk.queue.get(chat.chat_id).await?);
    }
    Ok(chats)
}

pub async fn seed_global_policy(desk: &DeskServices, first_response: Duration, resolution: Duration) -> Result<(), Error> {
    desk.stores
        .policies
        .upsert_policy(&SlaPolicy::global(first_response, resolution))
        .await
}

/// Create the test database if it does not exist yet.
pub async fn ensure_test_database_exists() -> Result<(), Error> {
    let admin_url = std::env::var("DATABASE_ADMIN_URL")
        .unwrap_or_else(|_| "postgres://chatdesk@localhost/postgres".to_string());

    let mut conn = PgConnection::connect(&admin_url).await?;
    let test_db = "chatdesk_test";

    match sqlx::query(&format!("CREATE DATABASE {test_db};")).execute(&mut conn).await {
        Ok(_) => {
            tracing::info!("Created test DB '{test_db}'.");
        }
        // 42P04 => duplicate_database
        Err(e) if e.as_database_error().and_then(|d| d.code()).as_deref() == Some("42P04") => {
            tracing::debug!("Test DB '{test_db}' already exists; ignoring.");
        }
        Err(e) => return Err(Error::Database(e)),
    }

    Ok(())
}

/// Pool on `TEST_DATABASE_URL`, else `postgres://chatdesk@localhost/chatdesk_test`.
pub async fn create_test_db_pool() -> Result<Pool<Postgres>, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://chatdesk@localhost/chatdesk_test".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    Ok(pool)
}

/// Wipes out test data so each test can start fresh.
pub async fn clean_database(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query(
        r#"
        TRUNCATE TABLE
            sla_breach_events,
            sla_policies,
            chat_sessions,
            agents
        RESTART IDENTITY CASCADE;
        "#,
    )
        .execute(pool)
        .await?;

    Ok(())
}

/// Returns a migrated, empty test DB handle.
pub async fn setup_test_database() -> Result<Database, Error> {
    ensure_test_database_exists().await?;

    let pool = create_test_db_pool().await?;
    let db = Database::from_pool(pool);
    db.migrate().await?;
    clean_database(db.pool()).await?;

    Ok(db)
}
