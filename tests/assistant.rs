//! Assistant front-end integration tests
//!
//! Submission rules, attachments and agent selection as a UI sees them.

mod support;

use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use support::*;
use switchboard::core::{AgentId, Attachment, Part};
use switchboard::{Assistant, SwitchboardError, ToolRegistry};

fn assistant(provider: &ScriptedProvider) -> Assistant {
    Assistant::new(engine(provider, ToolRegistry::new(), &test_config()))
}

#[tokio::test]
async fn test_empty_submission_is_rejected() {
    let provider = ScriptedProvider::new();
    let assistant = assistant(&provider);

    let err = assert_err!(assistant.submit("   ").await);
    assert!(matches!(err, SwitchboardError::EmptySubmission));
    assert!(assistant.store().is_empty().await);
    assert!(provider.sent().is_empty());
    assert!(!assistant.is_loading());
}

#[tokio::test]
async fn test_attachments_are_sent_and_consumed() {
    let provider = ScriptedProvider::new()
        .routes_to("generalist")
        .round(Step::Chunks(vec![text("Nice file.")]));
    let assistant = assistant(&provider);
    assistant
        .add_attachment(Attachment::text("notes.txt", "text/plain", "buy milk"))
        .await;

    let outcome = assert_ok!(assistant.submit("").await);

    assert!(assistant.attachments().await.is_empty());
    let sent = provider.sent();
    assert_eq!(
        sent[0],
        vec![Part::Text("\nFile: notes.txt\n```\nbuy milk\n```".to_string())]
    );

    let turns = assistant.store().list().await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].attachments.len(), 1);
    assert_eq!(turns[1].id, outcome.turn_id);
}

#[tokio::test]
async fn test_remove_attachment() {
    let assistant = assistant(&ScriptedProvider::new());
    assistant.add_attachment(Attachment::text("a.txt", "text/plain", "a")).await;
    assistant.add_attachment(Attachment::text("b.txt", "text/plain", "b")).await;

    assert_eq!(assistant.remove_attachment(0).await.map(|a| a.name), Some("a.txt".to_string()));
    assert!(assistant.remove_attachment(5).await.is_none());
    assert_eq!(assistant.attachments().await.len(), 1);
}

#[tokio::test]
async fn test_second_submission_while_loading_is_rejected() {
    let provider = ScriptedProvider::new()
        .routes_to("generalist")
        .round(Step::Hang(vec![text("working")]));
    let assistant = assistant(&provider);

    let cancel = CancellationToken::new();
    let first = {
        let assistant = assistant.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { assistant.submit_with_cancel("first", cancel).await })
    };

    while !assistant.is_loading() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let err = assert_err!(assistant.submit("second").await);
    assert!(matches!(err, SwitchboardError::TurnInFlight));
    assert!(matches!(assistant.clear().await, Err(SwitchboardError::TurnInFlight)));

    cancel.cancel();
    let outcome = assert_ok!(first.await.unwrap());
    assert!(outcome.cancelled);
    assert!(!assistant.is_loading());
    assert_eq!(assistant.store().len().await, 2);
}

#[tokio::test]
async fn test_set_agent_and_clear() {
    let provider = ScriptedProvider::new()
        .routes_to("analyst")
        .round(Step::Chunks(vec![text("4")]))
        .round(Step::Chunks(vec![text("done")]));
    let assistant = assistant(&provider);

    assert_ok!(assistant.submit("2+2").await);
    assert_eq!(assistant.active_agent().await, AgentId::Analyst);

    assert_ok!(assistant.clear().await);
    assert_eq!(assistant.active_agent().await, AgentId::Generalist);

    assistant.set_agent(Some(AgentId::CarSpecialist)).await;
    assert_eq!(assistant.active_agent().await, AgentId::CarSpecialist);
    assert_ok!(assistant.submit("any cars?").await);
    assert_eq!(provider.classify_calls(), 1);

    assert_ok!(assistant.clear().await);
    assert_eq!(assistant.active_agent().await, AgentId::CarSpecialist);

    assistant.set_agent(None).await;
    assert_eq!(assistant.manual_agent().await, None);
}

#[tokio::test]
async fn test_abandoned_submission_still_finalizes_turn() {
    let provider = ScriptedProvider::new()
        .routes_to("generalist")
        .round(Step::Hang(vec![text("half an answ")]));
    let assistant = assistant(&provider);

    let first = {
        let assistant = assistant.clone();
        tokio::spawn(async move { assistant.submit("tell me everything").await })
    };

    while assistant.store().len().await < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());
    assert!(!assistant.is_loading());

    let finalized = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let turns = assistant.store().list().await;
            if turns.iter().all(|turn| !turn.is_streaming) {
                return turns;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    let turns = assert_ok!(finalized);
    assert_eq!(turns.len(), 2);
}
