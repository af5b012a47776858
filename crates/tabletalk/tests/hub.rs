use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tabletalk::prelude::*;

fn frame(value: Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

fn opening(game: &str) -> Vec<Vec<u8>> {
    vec![
        frame(json!({"type": "game_connect", "gameId": game, "username": "alice"})),
        frame(json!({"type": "game_connect", "gameId": game, "username": "bob"})),
        frame(json!({"type": "game_started", "players": ["alice", "bob"]})),
    ]
}

#[tokio::test]
async fn test_sessions_run_independently() {
    let mut hub = Hub::new(PipelineConfig::default());

    let mut tasks = Vec::new();
    for (game, phase) in [("g1", "night"), ("g2", "day")] {
        let handle = hub.handle(&GameId::from(game)).unwrap();
        tasks.push(tokio::spawn(async move {
            let mut frames = opening(game);
            frames.push(frame(json!({"type": "phase", "phase": phase})));
            let mut outcomes = Vec::new();
            for frame in frames {
                outcomes.push(handle.submit(frame).await.unwrap());
            }
            outcomes
        }));
    }
    for task in tasks {
        let outcomes = task.await.unwrap();
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(Outcome::is_accepted), "{outcomes:?}");
    }

    assert_eq!(hub.game_ids(), vec![GameId::from("g1"), GameId::from("g2")]);
    let g1 = hub.info(&"g1".into()).await.unwrap().unwrap();
    let g2 = hub.info(&"g2".into()).await.unwrap().unwrap();
    assert_eq!(g1.state.phase(), Some("night"));
    assert_eq!(g2.state.phase(), Some("day"));
    assert_eq!(g1.participants, vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_destroyed_session_rejects_later_frames() {
    let mut hub = Hub::new(PipelineConfig::default());
    let game = GameId::from("g1");

    hub.submit(&game, frame(json!({"type": "game_connect", "gameId": "g1", "username": "alice"})))
        .await
        .unwrap();
    let last = hub
        .submit(&game, frame(json!({"type": "game_disconnect", "username": "alice"})))
        .await
        .unwrap();

    match last {
        Outcome::Accepted { transition, .. } => {
            assert_eq!(transition.to, LifecycleState::Disconnected);
        }
        other => panic!("expected accepted, got {other:?}"),
    }
    assert!(hub.is_finished(&game));
    assert!(hub.game_ids().is_empty());

    let late = hub
        .submit(&game, frame(json!({"type": "game_connect", "gameId": "g1", "username": "alice"})))
        .await;
    assert_eq!(late.unwrap_err(), HubError::Closed(game.clone()));
    assert_eq!(hub.info(&game).await.unwrap_err(), HubError::Closed(game));
}

#[tokio::test]
async fn test_close_returns_final_snapshot() {
    let mut hub = Hub::new(PipelineConfig::default());
    let game = GameId::from("g1");
    for frame in opening("g1") {
        hub.submit(&game, frame).await.unwrap();
    }

    let info = hub.close(&game).await.unwrap().unwrap();

    assert_eq!(info.accepted, 3);
    assert_eq!(info.roster, vec!["alice", "bob"]);
    assert!(hub.game_ids().is_empty());
    let late = hub.submit(&game, frame(json!({"type": "game_ended"}))).await;
    assert_eq!(late.unwrap_err(), HubError::Closed(game.clone()));
    assert_eq!(hub.close(&game).await.unwrap_err(), HubError::NotFound(game));
}

#[tokio::test]
async fn test_unknown_game_is_not_found() {
    let hub = Hub::new(PipelineConfig::default());
    let err = hub.info(&"nowhere".into()).await.unwrap_err();
    assert_eq!(err, HubError::NotFound("nowhere".into()));
}

#[tokio::test]
async fn test_connect_for_another_game_is_refused() {
    let mut hub = Hub::new(PipelineConfig::default());
    let outcome = hub
        .submit(&"g1".into(), frame(json!({"type": "game_connect", "gameId": "g2"})))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        Outcome::Refused(LifecycleError::GameMismatch { .. })
    ));
    assert!(hub.game_ids().is_empty());
    assert!(!hub.is_finished(&"g1".into()));
    assert_eq!(
        hub.info(&"g1".into()).await.unwrap_err(),
        HubError::NotFound("g1".into())
    );

    let retry = hub
        .submit(&"g1".into(), frame(json!({"type": "game_connect", "gameId": "g1"})))
        .await
        .unwrap();
    assert!(retry.is_accepted());
    assert_eq!(hub.game_ids(), vec![GameId::from("g1")]);
}

#[tokio::test]
async fn test_frames_before_connect_leave_no_actor() {
    let mut hub = Hub::new(PipelineConfig::default());

    for n in 0..10 {
        let game = GameId::from(format!("stray{n}"));
        let outcome = hub
            .submit(&game, frame(json!({"type": "phase", "phase": "night"})))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Refused(LifecycleError::UnknownSession { .. })));
        let outcome = hub.submit(&game, b"not json".to_vec()).await.unwrap();
        assert!(matches!(outcome, Outcome::Malformed(_)));
    }

    assert_eq!(hub.session_count(), 0);
    assert_eq!(hub.finished_count(), 0);
}

#[tokio::test]
async fn test_release_keeps_open_sessions() {
    let mut hub = Hub::new(PipelineConfig::default());
    let game = GameId::from("g1");
    hub.submit(&game, frame(json!({"type": "game_connect", "gameId": "g1"})))
        .await
        .unwrap();

    let outcome = hub.submit(&game, frame(json!({"type": "phase"}))).await.unwrap();
    assert!(matches!(outcome, Outcome::Malformed(_)));

    let handle = hub.handle(&game).unwrap();
    assert!(!handle.release().await.unwrap());
    assert_eq!(hub.game_ids(), vec![game.clone()]);
    assert_eq!(hub.info(&game).await.unwrap().unwrap().participants, vec!["System"]);
}

#[tokio::test]
async fn test_forget_reopens_a_finished_game() {
    let mut hub = Hub::new(PipelineConfig::default());
    let game = GameId::from("g1");
    let connect = || frame(json!({"type": "game_connect", "gameId": "g1", "username": "alice"}));

    hub.submit(&game, connect()).await.unwrap();
    hub.submit(&game, frame(json!({"type": "game_disconnect", "username": "alice"})))
        .await
        .unwrap();
    assert!(hub.is_finished(&game));
    assert_eq!(hub.finished_count(), 1);

    assert!(hub.forget(&game));
    assert!(!hub.forget(&game));
    assert_eq!(hub.finished_count(), 0);

    let outcome = hub.submit(&game, connect()).await.unwrap();
    assert!(outcome.is_accepted());
    let info = hub.info(&game).await.unwrap().unwrap();
    assert_eq!(info.accepted, 1);
}

#[tokio::test]
async fn test_pushed_frames_are_dispatched_in_order() {
    let seen: Arc<Mutex<Vec<(GameId, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let faults = Arc::new(Mutex::new(0usize));

    let mut hub = Hub::with_dispatchers(PipelineConfig::default(), {
        let seen = Arc::clone(&seen);
        let faults = Arc::clone(&faults);
        move |game_id: &GameId| {
            let mut dispatcher = Dispatcher::with_sink({
                let faults = Arc::clone(&faults);
                move |_: HandlerError| *faults.lock().unwrap() += 1
            });
            dispatcher.register(Tag::Phase, |event: &Event| match &event.body {
                Body::Phase { phase } if phase == "e50" => panic!("cannot render e50"),
                _ => Ok(()),
            });
            let seen = Arc::clone(&seen);
            let game_id = game_id.clone();
            dispatcher.register(Tag::Phase, move |event: &Event| {
                if let Body::Phase { phase } = &event.body {
                    seen.lock().unwrap().push((game_id.clone(), phase.clone()));
                }
                Ok(())
            });
            dispatcher
        }
    });

    let handle = hub.handle(&"g1".into()).unwrap();
    for frame in opening("g1") {
        handle.push(frame).await.unwrap();
    }
    for n in 1..=100 {
        handle
            .push(frame(json!({"type": "phase", "phase": format!("e{n}")})))
            .await
            .unwrap();
    }
    // Replies are queued behind the pushes, so this waits for all of them.
    let info = handle.info().await.unwrap().unwrap();

    assert_eq!(info.accepted, 103);
    let seen = seen.lock().unwrap();
    let phases: Vec<&str> = seen.iter().map(|(_, phase)| phase.as_str()).collect();
    let expected: Vec<String> = (1..=100).map(|n| format!("e{n}")).collect();
    assert_eq!(phases, expected);
    assert!(seen.iter().all(|(game, _)| game.as_str() == "g1"));
    assert_eq!(*faults.lock().unwrap(), 1);
}
