//! End-to-end dispatch engine tests against a scripted daemon API.

use async_trait::async_trait;
use sommctl::client::IdentifyApi;
use sommctl::dispatch::retry::RetryTracker;
use sommctl::dispatch::{
    handlers, Action, DispatchContext, DispatchEngine, Phase, StateChange, ValidatorMode,
};
use sommctl::fault::Fault;
use somm_common::{
    IdentifyAction, IdentifyError, IdentifyResult, InputType, MessagePayload, ParsedWine,
    StreamEvent, WineType,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

enum Script {
    Events(Vec<StreamEvent>),
    Fail(Fault),
}

struct FakeApi {
    script: Mutex<VecDeque<Script>>,
}

impl FakeApi {
    fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }

    fn play(&self, on_event: &mut (dyn FnMut(StreamEvent) + Send)) -> Result<(), Fault> {
        match self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .expect("script exhausted")
        {
            Script::Events(events) => {
                for event in events {
                    on_event(event);
                }
                Ok(())
            }
            Script::Fail(fault) => Err(fault),
        }
    }
}

#[async_trait]
impl IdentifyApi for FakeApi {
    async fn identify_text(
        &self,
        _text: &str,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<(), Fault> {
        self.play(on_event)
    }

    async fn identify_image(
        &self,
        _image_b64: &str,
        _mime_type: &str,
        _supplementary_text: Option<&str>,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<(), Fault> {
        self.play(on_event)
    }
}

fn margaux() -> ParsedWine {
    ParsedWine {
        producer: Some("Château Margaux".to_string()),
        wine_name: Some("Château Margaux".to_string()),
        vintage: Some(2018),
        region: Some("Margaux".to_string()),
        country: Some("France".to_string()),
        wine_type: Some(WineType::Red),
        grapes: vec!["Cabernet Sauvignon".to_string(), "Merlot".to_string()],
        confidence: 94,
    }
}

fn success_result(action: IdentifyAction) -> IdentifyResult {
    IdentifyResult {
        input_type: InputType::Text,
        intent: "identify_wine".to_string(),
        parsed: margaux(),
        confidence: 94,
        action,
        candidates: vec![],
        usage: None,
        escalation: None,
        inferences_applied: None,
        streamed: true,
        escalated: Some(false),
    }
}

fn success_script() -> Script {
    Script::Events(vec![
        StreamEvent::Field {
            field: "producer".to_string(),
            value: serde_json::json!("Château Margaux"),
        },
        StreamEvent::Field {
            field: "vintage".to_string(),
            value: serde_json::json!(2018),
        },
        StreamEvent::Field {
            field: "confidence".to_string(),
            value: serde_json::json!(94),
        },
        StreamEvent::Result(Box::new(success_result(IdentifyAction::AutoPopulate))),
        StreamEvent::Done,
    ])
}

fn engine_with(script: Vec<Script>) -> DispatchEngine {
    let ctx = Arc::new(DispatchContext::default());
    DispatchEngine::new(ctx, handlers::base_handler(FakeApi::new(script)), ValidatorMode::Warn)
}

fn record_phases(ctx: &DispatchContext) -> Arc<Mutex<Vec<Phase>>> {
    let phases = Arc::new(Mutex::new(Vec::new()));
    let sink = phases.clone();
    ctx.subscribe(Box::new(move |_, change| {
        if let StateChange::PhaseChanged(phase) = change {
            sink.lock().expect("phase sink").push(*phase);
        }
    }));
    phases
}

fn find_chips_message(ctx: &DispatchContext) -> Option<Uuid> {
    ctx.with_transcript(|t| {
        t.messages().iter().rev().find_map(|m| match &m.payload {
            MessagePayload::Chips { .. } => Some(m.id),
            _ => None,
        })
    })
}

#[tokio::test]
async fn test_add_to_cellar_in_greeting_is_a_no_op() {
    let engine = engine_with(vec![]);
    let ctx = engine.context().clone();

    engine.dispatch(Action::AddToCellar).await;

    assert_eq!(ctx.phase(), Phase::Greeting);
    assert!(ctx.add_flow().is_none());
    assert!(ctx.with_transcript(|t| t.is_empty()));
}

#[tokio::test]
async fn test_happy_path_phase_sequence() {
    let engine = engine_with(vec![success_script()]);
    let ctx = engine.context().clone();
    let phases = record_phases(&ctx);

    engine
        .dispatch(Action::SubmitText {
            text: "Château Margaux 2018".to_string(),
        })
        .await;
    assert_eq!(ctx.phase(), Phase::Confirming);
    assert!(ctx.identification().is_some());

    let chips = find_chips_message(&ctx).expect("chips offered after identification");
    engine
        .dispatch(Action::SelectChip {
            message_id: chips,
            chip_id: "add_to_cellar".to_string(),
        })
        .await;

    assert_eq!(ctx.phase(), Phase::Complete);
    let add_flow = ctx.add_flow().expect("add flow recorded");
    assert!(add_flow.submitted);
    assert_eq!(add_flow.wine.vintage, Some(2018));

    assert_eq!(
        *phases.lock().expect("phases"),
        vec![
            Phase::Identifying,
            Phase::Confirming,
            Phase::AddingWine,
            Phase::Complete
        ]
    );
}

#[tokio::test]
async fn test_start_over_clears_all_derived_state() {
    let engine = engine_with(vec![success_script()]);
    let ctx = engine.context().clone();

    engine
        .dispatch(Action::SubmitText {
            text: "Château Margaux 2018".to_string(),
        })
        .await;
    let chips = find_chips_message(&ctx).expect("chips message");
    engine
        .dispatch(Action::SelectChip {
            message_id: chips,
            chip_id: "add_to_cellar".to_string(),
        })
        .await;
    assert_eq!(ctx.phase(), Phase::Complete);

    engine.dispatch(Action::StartOver).await;

    assert_eq!(ctx.phase(), Phase::Greeting);
    assert!(ctx.identification().is_none());
    assert!(ctx.add_flow().is_none());
    assert!(ctx.enrichment().is_none());
    assert!(ctx.retry.last_action().is_none());
    // Only the fresh greeting remains
    assert_eq!(ctx.with_transcript(|t| t.len()), 1);
}

#[tokio::test]
async fn test_fault_funnels_to_error_phase_with_retry_chip() {
    let engine = engine_with(vec![Script::Fail(Fault::Api(IdentifyError::Timeout(
        "slow provider".to_string(),
    )))]);
    let ctx = engine.context().clone();

    engine
        .dispatch(Action::SubmitText {
            text: "Barolo 2016".to_string(),
        })
        .await;

    assert_eq!(ctx.phase(), Phase::Error);
    ctx.with_transcript(|t| {
        let error_messages: Vec<_> = t
            .messages()
            .iter()
            .filter(|m| matches!(m.payload, MessagePayload::Error { .. }))
            .collect();
        assert_eq!(error_messages.len(), 1, "exactly one transcript error");
        let chips = t
            .messages()
            .iter()
            .find_map(|m| match &m.payload {
                MessagePayload::Chips { chips, .. } => Some(chips.clone()),
                _ => None,
            })
            .expect("recovery chips");
        assert!(chips.iter().any(|c| c.id == "retry"));
        assert!(chips.iter().any(|c| c.id == "start_over"));
    });
}

#[tokio::test]
async fn test_mid_stream_error_event_is_a_fault() {
    let engine = engine_with(vec![Script::Events(vec![
        StreamEvent::Field {
            field: "producer".to_string(),
            value: serde_json::json!("Château Margaux"),
        },
        StreamEvent::Error(IdentifyError::Overloaded("busy".to_string())),
        StreamEvent::Done,
    ])]);
    let ctx = engine.context().clone();

    engine
        .dispatch(Action::SubmitText {
            text: "Château Margaux 2018".to_string(),
        })
        .await;

    assert_eq!(ctx.phase(), Phase::Error);
    assert!(ctx.identification().is_none());
}

#[tokio::test]
async fn test_retry_replays_the_failed_action() {
    let engine = engine_with(vec![
        Script::Fail(Fault::Api(IdentifyError::Server("boom".to_string()))),
        success_script(),
    ]);
    let ctx = engine.context().clone();

    engine
        .dispatch(Action::SubmitText {
            text: "Château Margaux 2018".to_string(),
        })
        .await;
    assert_eq!(ctx.phase(), Phase::Error);
    assert!(ctx.retry.last_action().is_some());

    engine.dispatch(Action::Retry).await;

    assert_eq!(ctx.phase(), Phase::Confirming);
    assert!(ctx.identification().is_some());
}

#[tokio::test]
async fn test_retry_record_expires() {
    let ctx = Arc::new(DispatchContext::with_retry(RetryTracker::new(
        Duration::from_millis(30),
    )));
    let engine = DispatchEngine::new(
        ctx.clone(),
        handlers::base_handler(FakeApi::new(vec![Script::Fail(Fault::Api(
            IdentifyError::Timeout("t".to_string()),
        ))])),
        ValidatorMode::Warn,
    );

    engine
        .dispatch(Action::SubmitText {
            text: "Rioja 2019".to_string(),
        })
        .await;
    assert!(ctx.retry.last_action().is_some());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(ctx.retry.last_action().is_none());

    // Expired record means retry is dropped by the validator
    engine.dispatch(Action::Retry).await;
    assert_eq!(ctx.phase(), Phase::Error);
}

#[tokio::test]
async fn test_double_chip_selection_is_ignored() {
    let engine = engine_with(vec![success_script()]);
    let ctx = engine.context().clone();

    engine
        .dispatch(Action::SubmitText {
            text: "Château Margaux 2018".to_string(),
        })
        .await;
    let chips = find_chips_message(&ctx).expect("chips message");

    engine
        .dispatch(Action::SelectChip {
            message_id: chips,
            chip_id: "add_to_cellar".to_string(),
        })
        .await;
    assert_eq!(ctx.phase(), Phase::Complete);
    let messages_after_first = ctx.with_transcript(|t| t.len());

    // A second rapid pick on the same message is a validated no-op
    engine
        .dispatch(Action::SelectChip {
            message_id: chips,
            chip_id: "add_to_cellar".to_string(),
        })
        .await;
    assert_eq!(ctx.phase(), Phase::Complete);
    assert_eq!(ctx.with_transcript(|t| t.len()), messages_after_first);
}

#[tokio::test]
async fn test_reject_returns_to_input_and_clears_identification() {
    let engine = engine_with(vec![success_script()]);
    let ctx = engine.context().clone();

    engine
        .dispatch(Action::SubmitText {
            text: "Château Margaux 2018".to_string(),
        })
        .await;
    let chips = find_chips_message(&ctx).expect("chips message");
    engine
        .dispatch(Action::SelectChip {
            message_id: chips,
            chip_id: "reject".to_string(),
        })
        .await;

    assert_eq!(ctx.phase(), Phase::AwaitingInput);
    assert!(ctx.identification().is_none());
}
