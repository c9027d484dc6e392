// tests/chat_lifecycle_tests.rs
use chrono::{Duration, Utc};

use chatdesk_core::{
    models::{AgentAvailability, ChatSession, ChatStatus, SchedulerConfig},
    Error,
};
use chatdesk_core::test_utils::helpers::*;

#[tokio::test]
async fn test_resolving_releases_the_slot() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    add_online_agent(desk, "agent-a", 2).await?;
    let chats = give_chats(desk, "agent-a", Utc::now() - Duration::minutes(10), 2).await?;
    assert!(!desk.registry.get_agent("agent-a").await?.has_capacity());

    let resolved = desk.queue.resolve(chats[0].chat_id, Utc::now()).await?;
    assert_eq!(resolved.status, ChatStatus::Resolved);
    assert!(resolved.closed_at.is_some());
    assert_eq!(desk.registry.get_agent("agent-a").await?.active_chat_count, 1);

    // Terminal chats stay terminal.
    let err = desk.queue.resolve(chats[0].chat_id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    let err = desk.queue.close(chats[0].chat_id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert_eq!(desk.registry.get_agent("agent-a").await?.active_chat_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_closing_a_queued_chat_touches_no_agent() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    add_online_agent(desk, "agent-a", 2).await?;
    let chat = add_chat_at(desk, Utc::now(), None).await?;

    let closed = desk.queue.close(chat.chat_id, Utc::now()).await?;
    assert_eq!(closed.status, ChatStatus::Closed);
    assert!(desk.queue.pending().await?.is_empty());
    assert_eq!(desk.registry.get_agent("agent-a").await?.active_chat_count, 0);

    // Closed chats are never picked up again.
    assert_eq!(desk.assignment.assign_unassigned().await?.assigned_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_first_response_is_recorded_once() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    let t0 = Utc::now() - Duration::minutes(30);
    let chat = add_chat_at(desk, t0, None).await?;

    let first = t0 + Duration::minutes(3);
    assert!(desk.queue.record_first_response(chat.chat_id, first).await?);
    assert!(!desk.queue.record_first_response(chat.chat_id, t0 + Duration::minutes(9)).await?);

    let stored = desk.queue.get(chat.chat_id).await?;
    assert_eq!(stored.first_response_at, Some(first));
    assert_eq!(stored.last_message_at, first);

    let later = t0 + Duration::minutes(12);
    desk.queue.record_message(chat.chat_id, later).await?;
    assert_eq!(desk.queue.get(chat.chat_id).await?.last_message_at, later);
    Ok(())
}

#[tokio::test]
async fn test_enqueue_rejects_assigned_sessions() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let mut chat = ChatSession::new("member", None, Utc::now());
    chat.status = ChatStatus::Assigned;
    chat.assigned_agent_id = Some("agent-a".into());
    chat.assigned_at = Some(Utc::now());

    let err = fx.desk.queue.enqueue(chat).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    Ok(())
}

#[tokio::test]
async fn test_going_offline_requeues_unanswered_chats() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    add_online_agent(desk, "agent-a", 5).await?;
    let chats = give_chats(desk, "agent-a", Utc::now() - Duration::minutes(10), 3).await?;
    desk.queue.record_first_response(chats[0].chat_id, Utc::now()).await?;

    let requeued = desk.registry.set_availability("agent-a", AgentAvailability::Offline).await?;
    assert_eq!(requeued.len(), 2);
    assert!(!requeued.contains(&chats[0].chat_id));

    let agent = desk.registry.get_agent("agent-a").await?;
    assert_eq!(agent.availability, AgentAvailability::Offline);
    assert_eq!(agent.active_chat_count, 1);

    for chat_id in &requeued {
        let chat = desk.queue.get(*chat_id).await?;
        assert_eq!(chat.status, ChatStatus::Unassigned);
        assert!(chat.assigned_agent_id.is_none());
    }

    // Another agent picks them up on the next pass.
    add_online_agent(desk, "agent-b", 5).await?;
    assert_eq!(desk.assignment.assign_unassigned().await?.assigned_count(), 2);
    assert_eq!(desk.registry.get_agent("agent-b").await?.active_chat_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_going_away_keeps_chats() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    add_online_agent(desk, "agent-a", 5).await?;
    give_chats(desk, "agent-a", Utc::now(), 2).await?;

    let requeued = desk.registry.set_availability("agent-a", AgentAvailability::Away).await?;
    assert!(requeued.is_empty());
    assert_eq!(desk.registry.get_agent("agent-a").await?.active_chat_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_capacity_changes() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    add_online_agent(desk, "agent-a", 5).await?;
    give_chats(desk, "agent-a", Utc::now(), 2).await?;

    let lowered = desk.registry.set_capacity("agent-a", 1).await?;
    assert_eq!(lowered.active_chat_count, 2);
    assert!(!lowered.is_eligible());

    add_chat_at(desk, Utc::now(), None).await?;
    assert_eq!(desk.assignment.assign_unassigned().await?.still_unassigned, 1);

    assert!(matches!(desk.registry.set_capacity("agent-a", -1).await, Err(Error::Configuration(_))));
    assert!(matches!(desk.registry.set_capacity("ghost", 3).await, Err(Error::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_registration_validation_and_upsert() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;

    let err = desk.registry.register_agent("agent-a", "A", 0, AgentAvailability::Online).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    add_online_agent(desk, "agent-a", 3).await?;
    give_chats(desk, "agent-a", Utc::now(), 1).await?;

    // Re-registering updates the directory but keeps the workload.
    let again = desk.registry.register_agent("agent-a", "Alice", 4, AgentAvailability::Online).await?;
    assert_eq!(again.display_name, "Alice");
    assert_eq!(again.max_concurrent_chats, 4);
    assert_eq!(again.active_chat_count, 1);

    assert_eq!(desk.registry.reconcile_workload().await?, 0);
    Ok(())
}
