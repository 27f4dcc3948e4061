//! Tests for the conversation state store in `src/telegram/fsm.rs`.

use remobot::telegram::fsm::{ConvState, FsmStore};

#[tokio::test]
async fn conversations_are_isolated_per_chat_and_user() {
    let store = FsmStore::new();
    store.start((100, 1), ConvState::ProjectName).await;
    store.start((100, 2), ConvState::ProjectAddress).await;
    store.start((200, 1), ConvState::ProjectBudget).await;

    let a = store.get((100, 1)).await.expect("state should exist");
    let b = store.get((100, 2)).await.expect("state should exist");
    let c = store.get((200, 1)).await.expect("state should exist");

    assert_eq!(a.state, ConvState::ProjectName);
    assert_eq!(b.state, ConvState::ProjectAddress);
    assert_eq!(c.state, ConvState::ProjectBudget);
    assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn set_state_keeps_the_data_bag() {
    let store = FsmStore::new();
    store.start((1, 1), ConvState::ProjectName).await;
    store
        .update_data((1, 1), |data| data.draft.name = Some("Квартира".to_owned()))
        .await;

    store.set_state((1, 1), ConvState::ProjectAddress).await;

    let conv = store.get((1, 1)).await.expect("state should exist");
    assert_eq!(conv.state, ConvState::ProjectAddress);
    assert_eq!(conv.data.draft.name.as_deref(), Some("Квартира"));
}

#[tokio::test]
async fn clear_ends_the_conversation() {
    let store = FsmStore::new();
    store.start((1, 1), ConvState::ProjectName).await;
    store.clear((1, 1)).await;
    assert!(store.get((1, 1)).await.is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn update_data_on_missing_conversation_is_a_noop() {
    let store = FsmStore::new();
    store
        .update_data((9, 9), |data| data.draft.name = Some("x".to_owned()))
        .await;
    assert!(store.get((9, 9)).await.is_none());
}

#[tokio::test]
async fn starting_again_replaces_the_previous_flow() {
    let store = FsmStore::new();
    store.start((1, 1), ConvState::ProjectName).await;
    store
        .update_data((1, 1), |data| data.draft.name = Some("Старый".to_owned()))
        .await;

    store.start((1, 1), ConvState::AiChat { project_id: 5 }).await;

    let conv = store.get((1, 1)).await.expect("state should exist");
    assert_eq!(conv.state, ConvState::AiChat { project_id: 5 });
    assert!(conv.data.draft.name.is_none(), "data bag should reset");
}
