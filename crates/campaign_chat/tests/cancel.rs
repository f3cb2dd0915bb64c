use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use campaign_chat::runtime::ChatRuntime;
use campaign_stream::{SessionController, SessionOutcome, SessionStatus};
use generation_engine::{
    CancelSignal, EngineProfile, GenerationEngine, GenerationRequest, StreamSignal,
};
use stream_protocol::{DecodedFrame, Envelope, ModeFlags};

const WAIT: Duration = Duration::from_secs(10);

/// Emits `start` then blocks until cancelled.
#[derive(Default)]
struct BlockingEngine {
    cancelled: AtomicUsize,
}

impl GenerationEngine for BlockingEngine {
    fn profile(&self) -> EngineProfile {
        EngineProfile {
            engine_id: "blocking".to_string(),
            endpoint: None,
        }
    }

    fn run(
        &self,
        req: GenerationRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(StreamSignal),
    ) -> Result<(), String> {
        let request_id = req.request_id;
        emit(StreamSignal::Opened { request_id });
        emit(StreamSignal::Frame {
            request_id,
            frame: DecodedFrame::Envelope(Envelope::start("working")),
        });

        while !cancel.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(5));
        }

        self.cancelled.fetch_add(1, Ordering::SeqCst);
        emit(StreamSignal::Cancelled { request_id });
        Ok(())
    }
}

/// Returns without ever emitting a terminal signal.
struct SilentEngine;

impl GenerationEngine for SilentEngine {
    fn profile(&self) -> EngineProfile {
        EngineProfile {
            engine_id: "silent".to_string(),
            endpoint: None,
        }
    }

    fn run(
        &self,
        req: GenerationRequest,
        _cancel: CancelSignal,
        emit: &mut dyn FnMut(StreamSignal),
    ) -> Result<(), String> {
        emit(StreamSignal::Opened {
            request_id: req.request_id,
        });
        Ok(())
    }
}

struct PanickingEngine;

impl GenerationEngine for PanickingEngine {
    fn profile(&self) -> EngineProfile {
        EngineProfile {
            engine_id: "panicking".to_string(),
            endpoint: None,
        }
    }

    fn run(
        &self,
        _req: GenerationRequest,
        _cancel: CancelSignal,
        _emit: &mut dyn FnMut(StreamSignal),
    ) -> Result<(), String> {
        panic!("engine exploded");
    }
}

fn wait_for_active(runtime: &ChatRuntime, message_id: &str) {
    for _ in 0..400 {
        runtime.flush();
        let active = runtime.with_controller(|controller| {
            controller
                .session(message_id)
                .is_some_and(|session| session.status() == SessionStatus::Active)
        });
        if active {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("session never became active");
}

#[test]
fn cancel_releases_the_worker_and_closes_the_session() {
    let engine = Arc::new(BlockingEngine::default());
    let runtime = ChatRuntime::new(SessionController::default(), engine.clone(), None);
    let started = runtime.submit("q", ModeFlags::default()).expect("submit");
    wait_for_active(&runtime, &started.message_id);

    assert_eq!(runtime.cancel_all(), vec![started.request.request_id]);
    assert!(runtime.wait_until_idle(WAIT, |_, _| {}));
    runtime.shutdown();

    assert_eq!(engine.cancelled.load(Ordering::SeqCst), 1);
    runtime.with_controller(|controller| {
        let session = controller.session(&started.message_id).expect("session");
        assert_eq!(session.status(), SessionStatus::Closed);
        assert_eq!(session.outcome(), Some(&SessionOutcome::Cancelled));
        assert!(!controller
            .transcript_entry(&started.message_id)
            .expect("entry")
            .streaming);
    });
}

#[test]
fn regenerate_supersedes_and_cancels_the_previous_stream() {
    let engine = Arc::new(BlockingEngine::default());
    let runtime = ChatRuntime::new(SessionController::default(), engine.clone(), None);
    let first = runtime.submit("q", ModeFlags::default()).expect("submit");
    wait_for_active(&runtime, &first.message_id);

    let second = runtime
        .regenerate(&first.message_id, ModeFlags::default())
        .expect("regenerate");
    assert_eq!(second.superseded, Some(first.request.request_id));
    wait_for_active(&runtime, &first.message_id);

    let writes_from_first = runtime.with_controller(|controller| {
        controller.fanout().writes_for(first.request.request_id)
    });
    runtime.cancel_all();
    assert!(runtime.wait_until_idle(WAIT, |_, _| {}));
    runtime.shutdown();

    assert_eq!(engine.cancelled.load(Ordering::SeqCst), 2);
    runtime.with_controller(|controller| {
        assert_eq!(
            controller.fanout().writes_for(first.request.request_id),
            writes_from_first
        );
        assert_eq!(
            controller
                .session(&first.message_id)
                .map(|session| session.request_id()),
            Some(second.request.request_id)
        );
    });
}

#[test]
fn engine_without_terminal_signal_fails_the_session() {
    let runtime = ChatRuntime::new(SessionController::default(), Arc::new(SilentEngine), None);
    let started = runtime.submit("q", ModeFlags::default()).expect("submit");

    assert!(runtime.wait_until_idle(WAIT, |_, _| {}));

    runtime.with_controller(|controller| {
        let session = controller.session(&started.message_id).expect("session");
        assert_eq!(session.status(), SessionStatus::Failed);
        assert_eq!(
            session.outcome(),
            Some(&SessionOutcome::TransportFailed(
                "Generation engine exited without terminal signal".to_string()
            ))
        );
    });
}

#[test]
fn panicking_engine_is_contained() {
    let runtime = ChatRuntime::new(SessionController::default(), Arc::new(PanickingEngine), None);
    let started = runtime.submit("q", ModeFlags::default()).expect("submit");

    assert!(runtime.wait_until_idle(WAIT, |_, _| {}));

    runtime.with_controller(|controller| {
        assert_eq!(
            controller
                .session(&started.message_id)
                .and_then(|session| session.outcome().cloned()),
            Some(SessionOutcome::TransportFailed(
                "Generation engine panicked".to_string()
            ))
        );
    });
}
