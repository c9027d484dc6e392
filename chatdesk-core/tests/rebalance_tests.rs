// tests/rebalance_tests.rs
use chrono::{Duration, Utc};

use chatdesk_core::{
    models::{AgentAvailability, SchedulerConfig},
    repositories::AgentRepository,
    Error,
};
use chatdesk_core::test_utils::helpers::*;

#[tokio::test]
async fn test_skewed_desk_moves_until_within_threshold() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    let t0 = Utc::now() - Duration::hours(1);

    add_online_agent(desk, "agent-a", 12).await?;
    add_online_agent(desk, "agent-b", 12).await?;
    let chats = give_chats(desk, "agent-a", t0, 10).await?;

    let now = Utc::now();
    let result = desk.rebalancing.rebalance_at(now).await?;
    assert_eq!(result.moved_count(), 3);

    let a = desk.registry.get_agent("agent-a").await?.active_chat_count;
    let b = desk.registry.get_agent("agent-b").await?.active_chat_count;
    assert_eq!((a, b), (7, 3));
    assert!((a - 5).abs() <= 2 && (b - 5).abs() <= 2);

    // The three most recently assigned chats moved, stamped with the move time.
    let newest: Vec<_> = chats.iter().rev().take(3).map(|c| c.chat_id).collect();
    for t in &result.transfers {
        assert!(newest.contains(&t.chat_id));
        let moved = desk.queue.get(t.chat_id).await?;
        assert_eq!(moved.assigned_agent_id.as_deref(), Some("agent-b"));
        assert_eq!(moved.assigned_at, Some(now));
    }
    assert_eq!(desk.stores.agents.reconcile_workload().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_answered_chats_never_move() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    let t0 = Utc::now() - Duration::hours(1);

    add_online_agent(desk, "agent-a", 12).await?;
    add_online_agent(desk, "agent-b", 12).await?;
    let chats = give_chats(desk, "agent-a", t0, 10).await?;

    // Only the oldest chat is still unanswered.
    for chat in chats.iter().skip(1) {
        desk.queue.record_first_response(chat.chat_id, Utc::now()).await?;
    }

    let result = desk.rebalancing.rebalance().await?;
    assert_eq!(result.moved_count(), 1);
    assert_eq!(result.transfers[0].chat_id, chats[0].chat_id);

    for chat in chats.iter().skip(1) {
        let stored = desk.queue.get(chat.chat_id).await?;
        assert_eq!(stored.assigned_agent_id.as_deref(), Some("agent-a"));
    }

    // Nothing movable left: another pass is a no-op.
    assert_eq!(desk.rebalancing.rebalance().await?.moved_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_single_online_agent_is_left_alone() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    add_online_agent(desk, "agent-a", 12).await?;
    desk.registry.register_agent("agent-b", "B", 12, AgentAvailability::Away).await?;
    give_chats(desk, "agent-a", Utc::now() - Duration::hours(1), 8).await?;

    assert_eq!(desk.rebalancing.rebalance().await?.moved_count(), 0);
    assert_eq!(desk.registry.get_agent("agent-a").await?.active_chat_count, 8);
    Ok(())
}

#[tokio::test]
async fn test_balanced_desk_is_a_noop() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    let t0 = Utc::now() - Duration::hours(1);
    add_online_agent(desk, "agent-a", 12).await?;
    add_online_agent(desk, "agent-b", 12).await?;
    give_chats(desk, "agent-a", t0, 4).await?;
    give_chats(desk, "agent-b", t0, 2).await?;

    assert_eq!(desk.rebalancing.rebalance().await?.moved_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_recipient_capacity_caps_moves() -> Result<(), Error> {
    let fx = memory_desk(SchedulerConfig::default());
    let desk = &fx.desk;
    add_online_agent(desk, "agent-a", 12).await?;
    add_online_agent(desk, "agent-b", 1).await?;
    give_chats(desk, "agent-a", Utc::now() - Duration::hours(1), 10).await?;

    let result = desk.rebalancing.rebalance().await?;
    assert_eq!(result.moved_count(), 1);
    let b = desk.registry.get_agent("agent-b").await?;
    assert_eq!(b.active_chat_count, b.max_concurrent_chats);
    Ok(())
}

#[tokio::test]
async fn test_threshold_is_configurable() -> Result<(), Error> {
    let config = SchedulerConfig {
        imbalance_threshold: 0.5,
        ..SchedulerConfig::default()
    };
    let fx = memory_desk(config);
    let desk = &fx.desk;
    add_online_agent(desk, "agent-a", 12).await?;
    add_online_agent(desk, "agent-b", 12).await?;
    give_chats(desk, "agent-a", Utc::now() - Duration::hours(1), 4).await?;

    // mean 2: a donates while above 2.5, b receives while below 1.5
    let result = desk.rebalancing.rebalance().await?;
    assert_eq!(result.moved_count(), 2);
    Ok(())
}
