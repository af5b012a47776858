use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tabletalk::prelude::*;

fn frame(value: Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

fn started_game(dispatcher: Dispatcher) -> Pipeline {
    let mut pipeline = Pipeline::from_config(&PipelineConfig::default(), dispatcher);
    for payload in [
        json!({"type": "game_connect", "gameId": "g1", "username": "alice"}),
        json!({"type": "game_connect", "gameId": "g1", "username": "bob"}),
        json!({"type": "game_started", "players": ["alice", "bob"]}),
    ] {
        assert!(pipeline.ingest(&payload).is_accepted());
    }
    pipeline
}

#[test]
fn test_turn_order_end_to_end() {
    let mut pipeline = Pipeline::from_config(&PipelineConfig::default(), Dispatcher::new());

    let connect = pipeline.ingest_frame(&frame(json!({"type": "game_connect", "gameId": "g1"})));
    let start =
        pipeline.ingest_frame(&frame(json!({"type": "game_started", "players": ["alice", "bob"]})));
    pipeline.ingest_frame(&frame(json!({"type": "next_speaker", "player": "alice"})));
    let bob = pipeline.ingest_frame(&frame(
        json!({"type": "player_action", "player": "bob", "action": "fold"}),
    ));
    let alice = pipeline.ingest_frame(&frame(
        json!({"type": "player_action", "player": "alice", "action": "fold"}),
    ));

    match connect {
        Outcome::Accepted { tag, transition, .. } => {
            assert_eq!(tag, Tag::GameConnect);
            assert_eq!(transition.from, LifecycleState::Idle);
            assert_eq!(transition.to, LifecycleState::Connecting);
        }
        other => panic!("connect not accepted: {other:?}"),
    }
    match start {
        Outcome::Accepted { transition, .. } => assert_eq!(
            transition.to,
            LifecycleState::InProgress {
                phase: "unset".into()
            }
        ),
        other => panic!("start not accepted: {other:?}"),
    }
    assert!(matches!(
        bob,
        Outcome::Refused(LifecycleError::OutOfTurn { ref player, .. }) if player == "bob"
    ));
    assert!(alice.is_accepted());

    let info = pipeline.info().unwrap();
    assert_eq!(info.accepted, 4);
    assert_eq!(info.refused, 1);
    assert_eq!(info.current_speaker.as_deref(), Some("alice"));
}

#[test]
fn test_refusals_carry_the_event() {
    let refused = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new();
    {
        let refused = Arc::clone(&refused);
        dispatcher.on_rejection(move |rejection: &Rejection| {
            if let Rejection::Refused { event, error } = rejection {
                refused.lock().unwrap().push((event.tag(), error.clone()));
            }
            Ok(())
        });
    }
    let mut pipeline = started_game(dispatcher);

    pipeline.ingest(&json!({"type": "game_ended"}));
    let outcome =
        pipeline.ingest(&json!({"type": "player_action", "player": "alice", "action": "vote"}));

    assert!(matches!(
        outcome,
        Outcome::Refused(LifecycleError::SessionTerminated { .. })
    ));
    let refused = refused.lock().unwrap();
    assert_eq!(refused.len(), 1);
    assert_eq!(refused[0].0, Tag::PlayerAction);
}

#[test]
fn test_handlers_see_events_in_order_despite_a_fault() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let faults = Arc::new(Mutex::new(Vec::new()));

    let mut dispatcher = Dispatcher::with_sink({
        let faults = Arc::clone(&faults);
        move |fault: HandlerError| faults.lock().unwrap().push(fault.to_string())
    });
    dispatcher.register(Tag::Phase, |event: &Event| match &event.body {
        Body::Phase { phase } if phase == "e50" => Err("cannot render e50".into()),
        _ => Ok(()),
    });
    {
        let seen = Arc::clone(&seen);
        dispatcher.register(Tag::Phase, move |event: &Event| {
            if let Body::Phase { phase } = &event.body {
                seen.lock().unwrap().push(phase.clone());
            }
            Ok(())
        });
    }
    let mut pipeline = started_game(dispatcher);

    for n in 1..=100 {
        let outcome = pipeline.ingest(&json!({"type": "phase", "phase": format!("e{n}")}));
        assert!(outcome.is_accepted());
    }

    let expected: Vec<String> = (1..=100).map(|n| format!("e{n}")).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
    assert_eq!(faults.lock().unwrap().len(), 1);
    assert_eq!(pipeline.info().unwrap().state.phase(), Some("e100"));
}

#[test]
fn test_strict_v1_rejects_latest_minimal_payloads() {
    let config = PipelineConfig::from_json(r#"{"compat": {"strict": "v1"}}"#).unwrap();
    let mut pipeline = Pipeline::from_config(&config, Dispatcher::new());

    let outcome = pipeline.ingest(&json!({"type": "game_connect", "gameId": "g1"}));

    assert!(matches!(
        outcome,
        Outcome::Malformed(ProtocolError::Envelope(DecodeError::MissingField {
            field: "message",
            ..
        }))
    ));
    assert!(pipeline.session().is_none());

    let full = pipeline.ingest(&json!({
        "type": "game_connect",
        "gameId": "g1",
        "message": "alice joined",
        "username": "alice",
        "timestamp": "2024-05-01T20:00:00Z"
    }));
    assert!(full.is_accepted());
}

#[test]
fn test_werewolf_night_narration() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new();
    for tag in [Tag::Phase, Tag::Prompt, Tag::Speech, Tag::Observation] {
        let lines = Arc::clone(&lines);
        dispatcher.register(tag, move |event: &Event| {
            lines.lock().unwrap().push(event.narration());
            Ok(())
        });
    }
    let mut pipeline = started_game(dispatcher);

    let stream = [
        json!({"type": "phase", "phase": "night", "message": "Night falls."}),
        json!({"type": "observation", "message": "You are the Seer."}),
        json!({
            "type": "prompt",
            "message": "Whose card do you look at?",
            "choices": [{"index": 0, "name": "bob"}],
            "multiple": false
        }),
        json!({"type": "phase", "phase": "day", "message": "Day breaks."}),
        json!({"type": "speech", "username": "bob", "message": "I'm a villager."}),
    ];
    for payload in &stream {
        assert!(pipeline.ingest(payload).is_accepted(), "{payload}");
    }

    let lines = lines.lock().unwrap();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "Night falls.");
    assert!(lines[2].contains("bob"));
    assert_eq!(lines[4], "bob: I'm a villager.");
    assert_eq!(pipeline.info().unwrap().state.phase(), Some("day"));
}

struct PanickingSink;

impl FaultSink for PanickingSink {
    fn report(&mut self, _fault: HandlerError) {
        panic!("sink down");
    }
}

#[test]
fn test_panicking_fault_sink_does_not_escape_ingest() {
    let mut dispatcher = Dispatcher::with_sink(PanickingSink);
    dispatcher.register(Tag::Phase, |_: &Event| Err("handler down".into()));
    let mut pipeline = started_game(dispatcher);

    let night = pipeline.ingest(&json!({"type": "phase", "phase": "night"}));
    let day = pipeline.ingest(&json!({"type": "phase", "phase": "day"}));

    match night {
        Outcome::Accepted { report, .. } => assert_eq!(report.faults, 1),
        other => panic!("expected accepted, got {other:?}"),
    }
    assert!(day.is_accepted());
    assert_eq!(pipeline.info().unwrap().state.phase(), Some("day"));
}
