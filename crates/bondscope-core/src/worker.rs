//! Background fetch worker.
//!
//! A [`FetchWorker`] walks its targets in order on its own OS thread, taking
//! one rate-limit permit per attempt. Everything it produces travels over an
//! `mpsc` channel as [`WorkerEvent`]s; the controlling thread drains the
//! channel through a [`FetchHandle`] and runs callbacks there, never on the
//! worker thread.
//!
//! ```rust,ignore
//! let callbacks = FetchCallbacks::new()
//!     .on_result(|coupons: BondCoupons| store.save(coupons))
//!     .on_progress(|progress| println!("{}/{}", progress.current, progress.total));
//! let mut handle = fetch(&session, Arc::new(CouponsRequest::new(api)), uids, RetryPolicy::default(), callbacks)?;
//! handle.pause();
//! handle.resume();
//! let exit = handle.wait();
//! ```

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    AcquireError, FetchError, FetchRequest, MethodLimiter, RequestOutcome, RetryPolicy,
    TokenSession, WorkerControl,
};

/// `current` of `total` targets handled so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

impl Progress {
    pub const fn new(current: usize, total: usize) -> Self {
        Self { current, total }
    }
}

/// How a worker run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Every target was handled; `failed` of them produced no payload.
    Completed { processed: usize, failed: usize },
    /// Cancellation was observed after `processed` targets.
    Interrupted { processed: usize },
    /// The batch could not run at all.
    Aborted(FetchError),
}

/// Message sent from the worker thread to its controller.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent<P> {
    Progress(Progress),
    Result { index: usize, payload: P },
    Log(String),
    Finished(WorkerExit),
}

/// One fetch cycle over a fixed list of targets.
pub struct FetchWorker<R: FetchRequest> {
    session: TokenSession,
    request: Arc<R>,
    targets: Vec<R::Target>,
    retry: RetryPolicy,
    control: Arc<WorkerControl>,
    events: Sender<WorkerEvent<R::Payload>>,
}

impl<R: FetchRequest> FetchWorker<R> {
    pub fn new(
        session: TokenSession,
        request: Arc<R>,
        targets: Vec<R::Target>,
        retry: RetryPolicy,
        events: Sender<WorkerEvent<R::Payload>>,
    ) -> Self {
        Self {
            session,
            request,
            targets,
            retry,
            control: Arc::new(WorkerControl::new()),
            events,
        }
    }

    pub fn control(&self) -> Arc<WorkerControl> {
        Arc::clone(&self.control)
    }

    /// Processes every target, then reports [`WorkerEvent::Finished`].
    pub fn run(self) -> WorkerExit {
        let exit = self.process();
        self.emit(WorkerEvent::Finished(exit.clone()));
        exit
    }

    fn process(&self) -> WorkerExit {
        let method = self.request.method();
        let total = self.targets.len();

        let Some(limiter) = self.session.limiter().for_method(method.as_str()) else {
            let error = FetchError::RateLimitUnconfigured {
                method: method.as_str().to_owned(),
            };
            self.log_warn(format!("{error}; skipping all {total} target(s)"));
            return WorkerExit::Aborted(error);
        };

        info!("fetching {total} target(s) via '{method}'");
        let mut processed = 0;
        let mut failed = 0;

        for (index, target) in self.targets.iter().enumerate() {
            if self.control.is_interrupted() || !self.control.wait_if_paused() {
                return self.interrupted(processed, total);
            }

            match self.fetch_target(&limiter, index, target) {
                Ok(Some(payload)) => self.emit(WorkerEvent::Result { index, payload }),
                Ok(None) => failed += 1,
                Err(FetchError::Interrupted) => return self.interrupted(processed, total),
                Err(error) => {
                    self.log_warn(format!("{error}; aborting at target {target}"));
                    return WorkerExit::Aborted(error);
                }
            }

            processed += 1;
            self.emit(WorkerEvent::Progress(Progress::new(index + 1, total)));
        }

        if !self.control.wait_if_paused() {
            return self.interrupted(processed, total);
        }

        debug!("fetch via '{method}' done: {processed} processed, {failed} without data");
        WorkerExit::Completed { processed, failed }
    }

    /// Runs all attempts for one target. `Ok(None)` when no payload was obtained.
    fn fetch_target(
        &self,
        limiter: &MethodLimiter,
        index: usize,
        target: &R::Target,
    ) -> Result<Option<R::Payload>, FetchError> {
        let max_attempts = self.retry.max_attempts();

        for attempt in 1..=max_attempts {
            if self.control.is_interrupted() {
                return Err(FetchError::Interrupted);
            }

            limiter
                .acquire(1, &self.control)
                .map_err(|error| match error {
                    AcquireError::Interrupted => FetchError::Interrupted,
                    other => FetchError::Throttled {
                        detail: other.to_string(),
                    },
                })?;
            let outcome = self.request.call(self.session.token(), target);
            limiter.release(1);

            let error = match outcome {
                RequestOutcome::Success(payload) => return Ok(Some(payload)),
                RequestOutcome::NotAttempted { reason } => {
                    self.log_warn(format!("target #{index} ({target}) skipped: {reason}"));
                    return Ok(None);
                }
                RequestOutcome::RequestError { code } => FetchError::RequestFailed { code },
                RequestOutcome::Exception { detail } => FetchError::RequestException { detail },
            };

            self.log_warn(format!(
                "target #{index} ({target}) attempt {attempt}/{max_attempts}: {error}"
            ));

            if attempt < max_attempts && !self.control.sleep(self.retry.delay_after_attempt(attempt)) {
                return Err(FetchError::Interrupted);
            }
        }

        self.log_warn(format!(
            "no data for target #{index} ({target}) after {max_attempts} tries"
        ));
        Ok(None)
    }

    fn interrupted(&self, processed: usize, total: usize) -> WorkerExit {
        self.log_info(format!("interrupted after {processed} of {total} target(s)"));
        WorkerExit::Interrupted { processed }
    }

    fn log_info(&self, line: String) {
        info!("{line}");
        self.emit(WorkerEvent::Log(line));
    }

    fn log_warn(&self, line: String) {
        warn!("{line}");
        self.emit(WorkerEvent::Log(line));
    }

    fn emit(&self, event: WorkerEvent<R::Payload>) {
        // A dropped receiver only means nobody listens any more.
        let _ = self.events.send(event);
    }
}

type ResultCallback<P> = Box<dyn FnMut(P)>;
type ProgressCallback = Box<dyn FnMut(Progress)>;
type LogCallback = Box<dyn FnMut(&str)>;

/// Consumers of worker output, invoked on the thread that pumps the handle.
pub struct FetchCallbacks<P> {
    on_result: ResultCallback<P>,
    on_progress: ProgressCallback,
    on_log: LogCallback,
}

impl<P> Default for FetchCallbacks<P> {
    fn default() -> Self {
        Self {
            on_result: Box::new(|_| {}),
            on_progress: Box::new(|_| {}),
            on_log: Box::new(|_| {}),
        }
    }
}

impl<P> FetchCallbacks<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_result(mut self, callback: impl FnMut(P) + 'static) -> Self {
        self.on_result = Box::new(callback);
        self
    }

    pub fn on_progress(mut self, callback: impl FnMut(Progress) + 'static) -> Self {
        self.on_progress = Box::new(callback);
        self
    }

    pub fn on_log(mut self, callback: impl FnMut(&str) + 'static) -> Self {
        self.on_log = Box::new(callback);
        self
    }

    fn dispatch(&mut self, event: WorkerEvent<P>) {
        match event {
            WorkerEvent::Progress(progress) => (self.on_progress)(progress),
            WorkerEvent::Result { payload, .. } => (self.on_result)(payload),
            WorkerEvent::Log(line) => (self.on_log)(&line),
            WorkerEvent::Finished(_) => {}
        }
    }
}

/// Controlling-thread side of a running [`FetchWorker`].
///
/// Dropping the handle cancels the worker and joins its thread.
pub struct FetchHandle<P> {
    control: Arc<WorkerControl>,
    events: Receiver<WorkerEvent<P>>,
    thread: Option<JoinHandle<WorkerExit>>,
    callbacks: FetchCallbacks<P>,
    progress: Progress,
    exit: Option<WorkerExit>,
}

impl<P: Send + 'static> FetchHandle<P> {
    /// Starts a worker thread for `targets`.
    pub fn spawn<R>(
        session: &TokenSession,
        request: Arc<R>,
        targets: Vec<R::Target>,
        retry: RetryPolicy,
    ) -> Result<Self, FetchError>
    where
        R: FetchRequest<Payload = P>,
    {
        let total = targets.len();
        let (sender, receiver) = mpsc::channel();
        let worker = FetchWorker::new(session.clone(), request, targets, retry, sender);
        let control = worker.control();

        let thread = thread::Builder::new()
            .name(String::from("fetch-worker"))
            .spawn(move || worker.run())
            .map_err(|error| FetchError::Spawn {
                detail: error.to_string(),
            })?;

        Ok(Self {
            control,
            events: receiver,
            thread: Some(thread),
            callbacks: FetchCallbacks::default(),
            progress: Progress::new(0, total),
            exit: None,
        })
    }

    pub fn with_callbacks(mut self, callbacks: FetchCallbacks<P>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn control(&self) -> &Arc<WorkerControl> {
        &self.control
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    /// Latest progress drained from the worker.
    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// Exit reported by the worker, once its `Finished` event was drained.
    pub fn exit(&self) -> Option<&WorkerExit> {
        self.exit.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.exit.is_some()
    }

    /// Takes every event queued so far without blocking.
    pub fn drain(&mut self) -> Vec<WorkerEvent<P>> {
        let mut drained = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.observe(&event);
                    drained.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.observe_disconnect();
                    break;
                }
            }
        }
        drained
    }

    /// Runs callbacks for every queued event. Returns the exit once known.
    pub fn pump(&mut self) -> Option<&WorkerExit> {
        for event in self.drain() {
            self.callbacks.dispatch(event);
        }
        self.exit.as_ref()
    }

    /// Blocks until the worker finishes, running callbacks as events arrive.
    pub fn wait(mut self) -> WorkerExit {
        while self.exit.is_none() {
            if let Some(event) = self.recv_blocking() {
                self.callbacks.dispatch(event);
            }
        }
        self.finish()
    }

    /// Blocks until the worker finishes and hands back the events not yet
    /// drained instead of dispatching them.
    pub fn collect(mut self) -> (Vec<WorkerEvent<P>>, WorkerExit) {
        let mut events = Vec::new();
        while self.exit.is_none() {
            events.extend(self.recv_blocking());
        }
        let exit = self.finish();
        (events, exit)
    }

    /// Cancels the worker (waking it if paused) and waits for it to exit.
    pub fn stop(self) -> WorkerExit {
        self.cancel();
        self.wait()
    }

    fn recv_blocking(&mut self) -> Option<WorkerEvent<P>> {
        match self.events.recv() {
            Ok(event) => {
                self.observe(&event);
                Some(event)
            }
            Err(_) => {
                self.observe_disconnect();
                None
            }
        }
    }

    fn finish(&mut self) -> WorkerExit {
        self.join_thread();
        self.exit
            .take()
            .unwrap_or(WorkerExit::Interrupted { processed: 0 })
    }

    fn observe(&mut self, event: &WorkerEvent<P>) {
        match event {
            WorkerEvent::Progress(progress) => self.progress = *progress,
            WorkerEvent::Finished(exit) => self.exit = Some(exit.clone()),
            WorkerEvent::Result { .. } | WorkerEvent::Log(_) => {}
        }
    }

    fn observe_disconnect(&mut self) {
        if self.exit.is_none() {
            let exit = self.join_thread().unwrap_or(WorkerExit::Aborted(
                FetchError::RequestException {
                    detail: String::from("fetch worker panicked"),
                },
            ));
            self.exit = Some(exit);
        }
    }

    fn join_thread(&mut self) -> Option<WorkerExit> {
        self.thread.take().and_then(|thread| thread.join().ok())
    }
}

impl<P> Drop for FetchHandle<P> {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.control.cancel();
            let _ = thread.join();
        }
    }
}

/// Starts fetching `targets` with `request`, delivering output to `callbacks`
/// whenever the returned handle is pumped.
pub fn fetch<R: FetchRequest>(
    session: &TokenSession,
    request: Arc<R>,
    targets: Vec<R::Target>,
    retry: RetryPolicy,
    callbacks: FetchCallbacks<R::Payload>,
) -> Result<FetchHandle<R::Payload>, FetchError> {
    Ok(FetchHandle::spawn(session, request, targets, retry)?.with_callbacks(callbacks))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::{Method, RateLimit, Token};

    /// Echoes targets back; fails the targets listed in `failing`.
    struct EchoRequest {
        calls: Mutex<Vec<u32>>,
        failing: Vec<u32>,
        latency: Duration,
    }

    impl EchoRequest {
        fn new(failing: Vec<u32>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing,
                latency: Duration::ZERO,
            }
        }

        fn slow(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> Vec<u32> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl FetchRequest for EchoRequest {
        type Target = u32;
        type Payload = u32;

        fn method(&self) -> Method {
            Method::GetLastPrices
        }

        fn call(&self, _token: &Token, target: &u32) -> RequestOutcome<u32> {
            self.calls.lock().expect("calls lock").push(*target);
            thread::sleep(self.latency);
            if self.failing.contains(target) {
                RequestOutcome::request_error("INTERNAL")
            } else {
                RequestOutcome::Success(*target * 10)
            }
        }
    }

    fn session(permits: u32) -> TokenSession {
        TokenSession::new(
            Token::new("t.test").expect("token"),
            vec![RateLimit::per_minute(Method::GetLastPrices.as_str(), permits).expect("limit")],
        )
    }

    fn run_worker(
        session: TokenSession,
        request: Arc<EchoRequest>,
        targets: Vec<u32>,
        retry: RetryPolicy,
    ) -> (WorkerExit, Vec<WorkerEvent<u32>>) {
        let (sender, receiver) = mpsc::channel();
        let exit = FetchWorker::new(session, request, targets, retry, sender).run();
        (exit, receiver.try_iter().collect())
    }

    #[test]
    fn processes_targets_in_order_and_reports_progress() {
        let request = Arc::new(EchoRequest::new(Vec::new()));
        let (exit, events) = run_worker(
            session(100),
            Arc::clone(&request),
            vec![1, 2, 3],
            RetryPolicy::no_retry(),
        );

        assert_eq!(exit, WorkerExit::Completed { processed: 3, failed: 0 });
        assert_eq!(request.calls(), vec![1, 2, 3]);

        let results: Vec<u32> = events
            .iter()
            .filter_map(|event| match event {
                WorkerEvent::Result { payload, .. } => Some(*payload),
                _ => None,
            })
            .collect();
        assert_eq!(results, vec![10, 20, 30]);

        let progress: Vec<Progress> = events
            .iter()
            .filter_map(|event| match event {
                WorkerEvent::Progress(progress) => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(
            progress,
            vec![Progress::new(1, 3), Progress::new(2, 3), Progress::new(3, 3)]
        );
        assert!(matches!(events.last(), Some(WorkerEvent::Finished(_))));
    }

    #[test]
    fn failing_target_is_retried_then_skipped() {
        let request = Arc::new(EchoRequest::new(vec![2]));
        let (exit, events) = run_worker(
            session(100),
            Arc::clone(&request),
            vec![1, 2, 3],
            RetryPolicy::immediate(2),
        );

        assert_eq!(exit, WorkerExit::Completed { processed: 3, failed: 1 });
        assert_eq!(request.calls(), vec![1, 2, 2, 2, 3]);

        let attempt_logs = events
            .iter()
            .filter(|event| matches!(event, WorkerEvent::Log(line) if line.contains("attempt")))
            .count();
        assert_eq!(attempt_logs, 3);
        assert!(events.contains(&WorkerEvent::Progress(Progress::new(2, 3))));
    }

    #[test]
    fn missing_rate_limit_aborts_the_batch() {
        let request = Arc::new(EchoRequest::new(Vec::new()));
        let unmetered = TokenSession::new(Token::new("t").expect("token"), Vec::new());
        let (exit, events) = run_worker(unmetered, Arc::clone(&request), vec![1, 2], RetryPolicy::no_retry());

        assert!(matches!(
            exit,
            WorkerExit::Aborted(FetchError::RateLimitUnconfigured { .. })
        ));
        assert!(request.calls().is_empty());
        assert!(events
            .iter()
            .any(|event| matches!(event, WorkerEvent::Log(line) if line.contains("rate limit not found"))));
    }

    #[test]
    fn cancelled_before_start_issues_no_request() {
        let request = Arc::new(EchoRequest::new(Vec::new()));
        let (sender, _receiver) = mpsc::channel();
        let worker = FetchWorker::new(
            session(10),
            Arc::clone(&request),
            vec![1, 2, 3],
            RetryPolicy::no_retry(),
            sender,
        );
        worker.control().cancel();

        assert_eq!(worker.run(), WorkerExit::Interrupted { processed: 0 });
        assert!(request.calls().is_empty());
    }

    #[test]
    fn each_attempt_consumes_a_permit() {
        let session = session(50);
        let request = Arc::new(EchoRequest::new(vec![1]));
        let (_exit, _events) = run_worker(
            session.clone(),
            request,
            vec![1, 2],
            RetryPolicy::immediate(1),
        );

        let limiter = session
            .limiter()
            .for_method(Method::GetLastPrices.as_str())
            .expect("configured");
        assert_eq!(limiter.available_at(std::time::Instant::now()), 47);
    }

    #[test]
    fn handle_delivers_callbacks_on_the_pumping_thread() {
        let results = Arc::new(AtomicUsize::new(0));
        let callbacks = {
            let results = Arc::clone(&results);
            FetchCallbacks::new().on_result(move |_payload: u32| {
                results.fetch_add(1, Ordering::SeqCst);
            })
        };

        let handle = fetch(
            &session(100),
            Arc::new(EchoRequest::new(Vec::new())),
            vec![1, 2, 3, 4],
            RetryPolicy::no_retry(),
            callbacks,
        )
        .expect("worker starts");

        let exit = handle.wait();
        assert_eq!(exit, WorkerExit::Completed { processed: 4, failed: 0 });
        assert_eq!(results.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn stop_wakes_a_paused_worker() {
        let handle = FetchHandle::spawn(
            &session(100),
            Arc::new(EchoRequest::slow(Duration::from_millis(20))),
            (1..=50).collect(),
            RetryPolicy::no_retry(),
        )
        .expect("worker starts");
        handle.pause();
        assert!(handle.control().wait_until_parked(Duration::from_secs(2)));

        let exit = handle.stop();
        assert!(matches!(exit, WorkerExit::Interrupted { processed } if processed < 50));
    }

    #[test]
    fn paused_worker_does_not_finish_until_resumed() {
        let request = Arc::new(EchoRequest::new(Vec::new()));
        let (sender, receiver) = mpsc::channel();
        let worker = FetchWorker::new(
            session(100),
            Arc::clone(&request),
            vec![1, 2],
            RetryPolicy::no_retry(),
            sender,
        );
        let control = worker.control();
        control.pause();
        let thread = thread::spawn(move || worker.run());

        assert!(control.wait_until_parked(Duration::from_secs(2)));
        assert!(request.calls().is_empty());
        assert!(receiver.try_recv().is_err());

        control.resume();
        assert_eq!(
            thread.join().expect("worker thread"),
            WorkerExit::Completed { processed: 2, failed: 0 }
        );
    }
}
