use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use campaign_stream::{Applied, SessionController, StartedSession};
use generation_engine::{CancelSignal, GenerationEngine, GenerationRequest, RequestId, StreamSignal};
use history_store::{HistoryStore, HistoryStoreError};
use stream_protocol::ModeFlags;
use tracing::{debug, warn};

const IDLE_POLL: Duration = Duration::from_millis(50);

struct Worker {
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

/// One signal after it reached the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedSignal {
    pub request_id: RequestId,
    pub applied: Applied,
}

/// Host runtime: one worker thread per stream, one FIFO of signals, one controller.
///
/// Workers only enqueue. Signals reach the controller when a caller drains the
/// queue with [`ChatRuntime::flush`] or [`ChatRuntime::wait_until_idle`], so all
/// sink writes happen on the caller's thread in arrival order.
pub struct ChatRuntime {
    controller: Mutex<SessionController>,
    pending: Mutex<VecDeque<StreamSignal>>,
    signal_ready: Condvar,
    workers: Mutex<HashMap<RequestId, Worker>>,
    engine: Arc<dyn GenerationEngine>,
    store: Mutex<Option<HistoryStore>>,
}

impl ChatRuntime {
    pub fn new(
        controller: SessionController,
        engine: Arc<dyn GenerationEngine>,
        store: Option<HistoryStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            controller: Mutex::new(controller),
            pending: Mutex::new(VecDeque::new()),
            signal_ready: Condvar::new(),
            workers: Mutex::new(HashMap::new()),
            engine,
            store: Mutex::new(store),
        })
    }

    /// Builds a controller over the store's history and keeps the store for saves.
    pub fn with_store(
        store: HistoryStore,
        engine: Arc<dyn GenerationEngine>,
        malformed_limit: usize,
    ) -> Arc<Self> {
        let controller =
            SessionController::with_malformed_limit(store.state().clone(), malformed_limit);
        Self::new(controller, engine, Some(store))
    }

    pub fn submit(self: &Arc<Self>, query: &str, modes: ModeFlags) -> Result<StartedSession, String> {
        let started = self
            .lock_controller()
            .submit(query, modes)
            .map_err(|error| error.to_string())?;
        self.launch(started)
    }

    pub fn regenerate(
        self: &Arc<Self>,
        message_id: &str,
        modes: ModeFlags,
    ) -> Result<StartedSession, String> {
        let started = self
            .lock_controller()
            .regenerate(message_id, modes)
            .map_err(|error| error.to_string())?;
        self.launch(started)
    }

    fn launch(self: &Arc<Self>, started: StartedSession) -> Result<StartedSession, String> {
        if let Some(previous) = started.superseded {
            self.signal_cancel(previous);
        }

        let request = started.request.clone();
        let request_id = request.request_id;
        let cancel = Arc::new(AtomicBool::new(false));
        let join_handle = match self.spawn_worker(request, Arc::clone(&cancel)) {
            Ok(join_handle) => join_handle,
            Err(error) => {
                self.lock_controller().apply(StreamSignal::TransportFailed {
                    request_id,
                    error: error.clone(),
                });
                return Err(error);
            }
        };

        lock_unpoisoned(&self.workers).insert(
            request_id,
            Worker {
                cancel,
                join_handle: Some(join_handle),
            },
        );
        Ok(started)
    }

    fn spawn_worker(
        self: &Arc<Self>,
        request: GenerationRequest,
        cancel: CancelSignal,
    ) -> Result<JoinHandle<()>, String> {
        let request_id = request.request_id;
        let runtime = Arc::clone(self);
        thread::Builder::new()
            .name(format!("campaign-stream-{request_id}"))
            .spawn(move || runtime.run_worker(request, cancel))
            .map_err(|error| format!("Failed to spawn stream worker: {error}"))
    }

    fn run_worker(self: Arc<Self>, request: GenerationRequest, cancel: CancelSignal) {
        let request_id = request.request_id;
        let terminal_emitted = Arc::new(AtomicBool::new(false));
        let terminal_emitted_for_emit = Arc::clone(&terminal_emitted);
        let runtime = Arc::clone(&self);
        let engine = Arc::clone(&self.engine);

        let mut emit = move |signal: StreamSignal| {
            if signal.is_terminal() {
                terminal_emitted_for_emit.store(true, Ordering::SeqCst);
            }
            runtime.enqueue(signal);
        };
        let run_outcome = catch_unwind(AssertUnwindSafe(|| {
            engine.run(request, Arc::clone(&cancel), &mut emit)
        }));

        match run_outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => emit(StreamSignal::TransportFailed { request_id, error }),
            Err(_) => emit(StreamSignal::TransportFailed {
                request_id,
                error: "Generation engine panicked".to_string(),
            }),
        }

        if !terminal_emitted.load(Ordering::SeqCst) {
            emit(StreamSignal::TransportFailed {
                request_id,
                error: "Generation engine exited without terminal signal".to_string(),
            });
        }
    }

    fn enqueue(&self, signal: StreamSignal) {
        lock_unpoisoned(&self.pending).push_back(signal);
        self.signal_ready.notify_all();
    }

    /// Applies every queued signal in arrival order.
    pub fn flush(&self) -> Vec<AppliedSignal> {
        let mut applied = Vec::new();
        let mut reached_terminal = false;

        loop {
            let signal = lock_unpoisoned(&self.pending).pop_front();
            let Some(signal) = signal else {
                break;
            };

            let request_id = signal.request_id();
            let outcome = self.lock_controller().apply(signal);
            if outcome == Applied::Terminal {
                reached_terminal = true;
                self.retire_worker(request_id);
            }
            applied.push(AppliedSignal {
                request_id,
                applied: outcome,
            });
        }

        if reached_terminal {
            self.persist_if_dirty();
        }
        applied
    }

    /// Drains signals until no stream is live, reporting each one to `observe`.
    ///
    /// Returns `false` when `timeout` elapses first.
    pub fn wait_until_idle(
        &self,
        timeout: Duration,
        mut observe: impl FnMut(&SessionController, AppliedSignal),
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            for signal in self.flush() {
                observe(&self.lock_controller(), signal);
            }
            if self.is_idle() {
                self.reap_finished_workers();
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let pending = lock_unpoisoned(&self.pending);
            if pending.is_empty() {
                let wait = (deadline - now).min(IDLE_POLL);
                let _ = self.signal_ready.wait_timeout(pending, wait);
            }
        }
    }

    /// Cancels every live stream and persists the resulting history.
    pub fn cancel_all(&self) -> Vec<RequestId> {
        let cancelled = self.lock_controller().cancel_all();
        for request_id in &cancelled {
            self.signal_cancel(*request_id);
        }
        if !cancelled.is_empty() {
            self.persist_if_dirty();
        }
        cancelled
    }

    pub fn is_streaming(&self) -> bool {
        self.lock_controller().is_streaming()
    }

    fn is_idle(&self) -> bool {
        let queue_empty = lock_unpoisoned(&self.pending).is_empty();
        queue_empty && !self.is_streaming()
    }

    /// Runs `f` with exclusive access to the controller.
    pub fn with_controller<R>(&self, f: impl FnOnce(&mut SessionController) -> R) -> R {
        f(&mut self.lock_controller())
    }

    /// Writes the controller's history to the store, if one is configured.
    pub fn save_history(&self) -> Result<(), HistoryStoreError> {
        let history = self.lock_controller().history().clone();
        let mut store = lock_unpoisoned(&self.store);
        let Some(store) = store.as_mut() else {
            return Ok(());
        };
        store.replace_state(history);
        store.save()
    }

    fn persist_if_dirty(&self) {
        if !self.lock_controller().take_history_dirty() {
            return;
        }
        if let Err(error) = self.save_history() {
            warn!(%error, "failed to save conversation history");
        }
    }

    /// Cancels and joins every worker. Call before dropping the runtime.
    pub fn shutdown(&self) {
        self.cancel_all();
        let workers = lock_unpoisoned(&self.workers)
            .drain()
            .map(|(_, worker)| worker)
            .collect::<Vec<_>>();
        for mut worker in workers {
            worker.cancel.store(true, Ordering::SeqCst);
            if let Some(join_handle) = worker.join_handle.take() {
                let _ = join_handle.join();
            }
        }
        self.flush();
        self.persist_if_dirty();
    }

    fn signal_cancel(&self, request_id: RequestId) {
        if let Some(worker) = lock_unpoisoned(&self.workers).get(&request_id) {
            worker.cancel.store(true, Ordering::SeqCst);
            debug!(request_id, "cancel flag raised");
        }
    }

    fn retire_worker(&self, request_id: RequestId) {
        let Some(mut worker) = lock_unpoisoned(&self.workers).remove(&request_id) else {
            return;
        };
        // A terminal signal can arrive before the worker thread returns.
        worker.cancel.store(true, Ordering::SeqCst);
        if let Some(join_handle) = worker.join_handle.take() {
            let is_current_thread = join_handle.thread().id() == thread::current().id();
            if !is_current_thread && join_handle.is_finished() {
                let _ = join_handle.join();
            } else {
                lock_unpoisoned(&self.workers).insert(
                    request_id,
                    Worker {
                        cancel: worker.cancel,
                        join_handle: Some(join_handle),
                    },
                );
            }
        }
    }

    fn reap_finished_workers(&self) {
        let mut workers = lock_unpoisoned(&self.workers);
        let finished = workers
            .iter()
            .filter(|(_, worker)| {
                worker
                    .join_handle
                    .as_ref()
                    .map_or(true, JoinHandle::is_finished)
            })
            .map(|(request_id, _)| *request_id)
            .collect::<Vec<_>>();
        for request_id in finished {
            if let Some(mut worker) = workers.remove(&request_id) {
                if let Some(join_handle) = worker.join_handle.take() {
                    let _ = join_handle.join();
                }
            }
        }
    }

    pub fn live_worker_count(&self) -> usize {
        lock_unpoisoned(&self.workers).len()
    }

    fn lock_controller(&self) -> MutexGuard<'_, SessionController> {
        lock_unpoisoned(&self.controller)
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
