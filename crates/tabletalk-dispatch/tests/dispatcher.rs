use std::sync::{Arc, Mutex};

use tabletalk_dispatch::{Dispatcher, FaultCause, HandlerError, Route};
use tabletalk_protocol::{Body, Event, Tag};

fn numbered(n: usize) -> Event {
    Event::new(Body::Phase {
        phase: format!("e{n}"),
    })
}

fn phase_of(event: &Event) -> String {
    match &event.body {
        Body::Phase { phase } => phase.clone(),
        other => panic!("unexpected body {other:?}"),
    }
}

#[test]
fn test_faulting_handler_does_not_disturb_ordering() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let faults: Arc<Mutex<Vec<HandlerError>>> = Arc::new(Mutex::new(Vec::new()));

    let mut dispatcher = Dispatcher::with_sink({
        let faults = Arc::clone(&faults);
        move |fault: HandlerError| faults.lock().unwrap().push(fault)
    });
    dispatcher.register(Tag::Phase, |event: &Event| {
        if phase_of(event) == "e50" {
            return Err("e50 is cursed".into());
        }
        Ok(())
    });
    {
        let seen = Arc::clone(&seen);
        dispatcher.register(Tag::Phase, move |event: &Event| {
            seen.lock().unwrap().push(phase_of(event));
            Ok(())
        });
    }

    for n in 1..=100 {
        dispatcher.dispatch(&numbered(n));
    }

    let expected: Vec<String> = (1..=100).map(|n| format!("e{n}")).collect();
    assert_eq!(*seen.lock().unwrap(), expected);

    let faults = faults.lock().unwrap();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].route, Route::Event(Tag::Phase));
    assert_eq!(faults[0].handler, 0);
}

#[test]
fn test_panicking_handler_keeps_receiving_later_events() {
    let calls = Arc::new(Mutex::new(0usize));
    let faults = Arc::new(Mutex::new(0usize));

    let mut dispatcher = Dispatcher::with_sink({
        let faults = Arc::clone(&faults);
        move |fault: HandlerError| {
            assert!(matches!(fault.cause, FaultCause::Panicked(_)));
            *faults.lock().unwrap() += 1;
        }
    });
    {
        let calls = Arc::clone(&calls);
        dispatcher.register(Tag::Phase, move |event: &Event| {
            *calls.lock().unwrap() += 1;
            if phase_of(event) == "e2" {
                panic!("handler bug");
            }
            Ok(())
        });
    }

    for n in 1..=3 {
        dispatcher.dispatch(&numbered(n));
    }

    assert_eq!(*calls.lock().unwrap(), 3);
    assert_eq!(*faults.lock().unwrap(), 1);
}

#[test]
fn test_a_dispatcher_can_move_to_another_thread() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Tag::GameEnded, |_: &Event| Ok(()));

    let report = std::thread::spawn(move || dispatcher.dispatch(&Event::new(Body::GameEnded)))
        .join()
        .unwrap();

    assert_eq!(report.delivered, 1);
}
