//! Explicit state machine around one fetch worker.
//!
//! | State          | Start   | Pause  | Resume  | Stop      | InputsChanged(ok / missing)  | WorkerFinished |
//! |----------------|---------|--------|---------|-----------|------------------------------|----------------|
//! | `NotStartable` |         |        |         |           | `Startable` / `NotStartable` |                |
//! | `Startable`    | Running |        |         |           | `Startable` / `NotStartable` |                |
//! | `Running`      |         | Paused |         | Startable | `Startable` / `NotStartable` | `Finished`     |
//! | `Paused`       |         |        | Running | Startable | `Startable` / `NotStartable` |                |
//! | `Finished`     | Running |        |         |           | `Startable` / `NotStartable` |                |
//!
//! Empty cells are rejected with [`TransitionError`].

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    ControllerError, FetchHandle, FetchRequest, Progress, RetryPolicy, TokenSession,
    TransitionError, WorkerControl, WorkerEvent, WorkerExit,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerState {
    NotStartable,
    Startable,
    Running,
    Paused,
    Finished,
}

impl WorkerState {
    pub const ALL: [Self; 5] = [
        Self::NotStartable,
        Self::Startable,
        Self::Running,
        Self::Paused,
        Self::Finished,
    ];

    /// Whether a worker thread belongs to this state.
    pub const fn has_worker(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerEvent {
    /// Token or target list changed; `available` when both are present.
    InputsChanged { available: bool },
    Start,
    Pause,
    Resume,
    Stop,
    WorkerFinished,
}

impl ControllerEvent {
    pub const ALL: [Self; 7] = [
        Self::InputsChanged { available: true },
        Self::InputsChanged { available: false },
        Self::Start,
        Self::Pause,
        Self::Resume,
        Self::Stop,
        Self::WorkerFinished,
    ];
}

/// The complete transition table.
pub fn transition(state: WorkerState, event: ControllerEvent) -> Result<WorkerState, TransitionError> {
    use ControllerEvent as E;
    use WorkerState as S;

    match (state, event) {
        (_, E::InputsChanged { available: true }) => Ok(S::Startable),
        (_, E::InputsChanged { available: false }) => Ok(S::NotStartable),
        (S::Startable | S::Finished, E::Start) => Ok(S::Running),
        (S::Running, E::Pause) => Ok(S::Paused),
        (S::Paused, E::Resume) => Ok(S::Running),
        (S::Running | S::Paused, E::Stop) => Ok(S::Startable),
        (S::Running, E::WorkerFinished) => Ok(S::Finished),
        (state, event) => Err(TransitionError { state, event }),
    }
}

/// Label of the start button, which doubles as resume while paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartLabel {
    Start,
    Resume,
}

/// Which commands are currently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    pub start_enabled: bool,
    pub start_label: StartLabel,
    pub pause_enabled: bool,
    pub stop_enabled: bool,
}

impl Controls {
    pub const fn for_state(state: WorkerState) -> Self {
        let (start_enabled, start_label) = match state {
            WorkerState::Startable | WorkerState::Finished => (true, StartLabel::Start),
            WorkerState::Paused => (true, StartLabel::Resume),
            WorkerState::NotStartable | WorkerState::Running => (false, StartLabel::Start),
        };
        Self {
            start_enabled,
            start_label,
            pause_enabled: matches!(state, WorkerState::Running),
            stop_enabled: state.has_worker(),
        }
    }
}

/// Owns at most one live [`FetchHandle`] and drives it through [`transition`].
///
/// All methods run on the controlling thread; worker output reaches it only
/// through [`WorkerController::poll`].
pub struct WorkerController<R: FetchRequest> {
    request: Arc<R>,
    retry: RetryPolicy,
    session: Option<TokenSession>,
    targets: Vec<R::Target>,
    state: WorkerState,
    handle: Option<FetchHandle<R::Payload>>,
    progress: Progress,
    last_exit: Option<WorkerExit>,
}

impl<R: FetchRequest> WorkerController<R> {
    pub fn new(request: Arc<R>, retry: RetryPolicy) -> Self {
        Self {
            request,
            retry,
            session: None,
            targets: Vec::new(),
            state: WorkerState::NotStartable,
            handle: None,
            progress: Progress::default(),
            last_exit: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn controls(&self) -> Controls {
        Controls::for_state(self.state)
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// How the most recent worker ended.
    pub fn last_exit(&self) -> Option<&WorkerExit> {
        self.last_exit.as_ref()
    }

    pub fn has_live_worker(&self) -> bool {
        self.handle.is_some()
    }

    /// Control block of the live worker, if any.
    pub fn worker_control(&self) -> Option<Arc<WorkerControl>> {
        self.handle.as_ref().map(|handle| Arc::clone(handle.control()))
    }

    pub fn targets(&self) -> &[R::Target] {
        &self.targets
    }

    /// Replaces the token session. A running worker is stopped first.
    pub fn set_session(&mut self, session: Option<TokenSession>) -> Vec<WorkerEvent<R::Payload>> {
        self.session = session;
        self.inputs_changed()
    }

    /// Replaces the target list. A running worker is stopped first.
    pub fn set_targets(&mut self, targets: Vec<R::Target>) -> Vec<WorkerEvent<R::Payload>> {
        self.targets = targets;
        self.inputs_changed()
    }

    pub fn start(&mut self) -> Result<(), ControllerError> {
        let next = transition(self.state, ControllerEvent::Start)?;
        if self.handle.is_some() {
            return Err(ControllerError::WorkerAlive);
        }
        let session = match &self.session {
            Some(session) if !self.targets.is_empty() => session,
            _ => return Err(ControllerError::MissingInputs),
        };

        let handle = FetchHandle::spawn(
            session,
            Arc::clone(&self.request),
            self.targets.clone(),
            self.retry,
        )?;
        self.handle = Some(handle);
        self.progress = Progress::new(0, self.targets.len());
        self.last_exit = None;
        self.enter(next);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ControllerError> {
        let next = transition(self.state, ControllerEvent::Pause)?;
        if let Some(handle) = &self.handle {
            handle.pause();
        }
        self.enter(next);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), ControllerError> {
        let next = transition(self.state, ControllerEvent::Resume)?;
        if let Some(handle) = &self.handle {
            handle.resume();
        }
        self.enter(next);
        Ok(())
    }

    /// Cancels the worker and waits for it to exit.
    ///
    /// Returns the events it produced that were not polled yet.
    pub fn stop(&mut self) -> Result<Vec<WorkerEvent<R::Payload>>, ControllerError> {
        let next = transition(self.state, ControllerEvent::Stop)?;
        let leftover = self.shutdown_worker();
        self.enter(next);
        Ok(leftover)
    }

    /// Drains worker events on the calling thread and applies `WorkerFinished`.
    pub fn poll(&mut self) -> Vec<WorkerEvent<R::Payload>> {
        let Some(handle) = self.handle.as_mut() else {
            return Vec::new();
        };

        let events = handle.drain();
        self.progress = handle.progress();
        if handle.is_finished() {
            self.reap();
        }
        events
    }

    fn reap(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let (_, exit) = handle.collect();
        debug!("fetch worker exited: {exit:?}");
        self.last_exit = Some(exit);

        if self.state == WorkerState::Paused {
            // Finished before it reached the pause barrier.
            self.apply(ControllerEvent::Resume);
        }
        self.apply(ControllerEvent::WorkerFinished);
    }

    fn inputs_changed(&mut self) -> Vec<WorkerEvent<R::Payload>> {
        let available = self.session.is_some() && !self.targets.is_empty();
        let leftover = if self.state.has_worker() {
            self.shutdown_worker()
        } else {
            Vec::new()
        };
        self.apply(ControllerEvent::InputsChanged { available });
        leftover
    }

    fn shutdown_worker(&mut self) -> Vec<WorkerEvent<R::Payload>> {
        let Some(handle) = self.handle.take() else {
            return Vec::new();
        };
        // Cancelling also releases the pause barrier.
        handle.cancel();
        let (events, exit) = handle.collect();
        info!("fetch worker stopped: {exit:?}");
        self.last_exit = Some(exit);
        self.progress = Progress::default();
        events
    }

    fn apply(&mut self, event: ControllerEvent) {
        match transition(self.state, event) {
            Ok(next) => self.enter(next),
            Err(error) => warn!("{error}"),
        }
    }

    fn enter(&mut self, next: WorkerState) {
        if next != self.state {
            debug!("worker state {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }
}

impl<R: FetchRequest> Drop for WorkerController<R> {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}
