//! Lazily spawned process handles.

use dzx_config::{Config, SharedConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::IntoFuture;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::process::ChildStdin;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::buffer::ChannelBuffer;
use crate::command::Command;
use crate::driver;
use crate::error::{ProcessError, RunError};
use crate::output::{ProcessOutput, ProcessStatus};
use crate::pipe::{PipeTarget, PipeThrough};
use crate::policy::{Policy, RetryPolicy};
use crate::signal::{Signal, signal_group};
use crate::stdin::StdinWriter;
use crate::view::{Channel, ChannelView, LineReader, LockState, ViewShared};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Where a handle is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    /// Nothing has asked for the process yet.
    Unstarted,
    Running,
    /// The final attempt exited; output may still be flowing to consumers.
    Draining,
    /// Output is fully delivered and no view is held.
    Closed,
}

pub(crate) type Outcome = Result<ProcessOutput, ProcessError>;

/// Completion of a task attached to a handle, such as a tee or a feeder.
type LinkState = Option<Result<(), String>>;

#[derive(Debug, Default)]
struct StartState {
    started: bool,
    stdin_claimed: bool,
}

pub(crate) struct HandleInner {
    pub(crate) id: u64,
    pub(crate) command: Command,
    config: SharedConfig,
    snapshot: OnceLock<Arc<Config>>,
    pub(crate) location: &'static Location<'static>,
    start: Mutex<StartState>,
    policy: Mutex<Policy>,
    lifecycle: watch::Sender<Lifecycle>,
    outcome: watch::Sender<Option<Outcome>>,
    pub(crate) pid: AtomicU32,
    /// Process group of the attempt being driven; 0 once it was reaped.
    pub(crate) group: AtomicU32,
    retries: AtomicU32,
    /// Set by an explicit kill; no further attempts follow.
    killed: AtomicBool,
    pub(crate) kill_token: CancellationToken,
    /// Set when the current attempt was signalled, by kill or by timeout.
    pub(crate) attempt_killed: AtomicBool,
    finished: AtomicBool,
    pub(crate) stdout: Arc<ViewShared>,
    pub(crate) stderr: Arc<ViewShared>,
    pub(crate) combined: Arc<ViewShared>,
    pub(crate) stdin: OnceLock<AsyncMutex<Option<ChildStdin>>>,
    links: Mutex<Vec<watch::Receiver<LinkState>>>,
    upstream: Mutex<Option<ProcessHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HandleInner {
    pub(crate) fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub(crate) fn set_retries(&self, retries: u32) {
        self.retries.store(retries, Ordering::SeqCst);
    }

    pub(crate) fn set_lifecycle(&self, next: Lifecycle) {
        self.lifecycle.send_if_modified(|current| {
            if *current == next || *current == Lifecycle::Closed {
                return false;
            }
            debug!(handle = self.id, from = ?*current, to = ?next, "Lifecycle transition");
            *current = next;
            true
        });
    }

    pub(crate) fn buffers(&self) -> [&Arc<ChannelBuffer>; 3] {
        [
            self.stdout.buffer(),
            self.stderr.buffer(),
            self.combined.buffer(),
        ]
    }

    /// A consumer of stdout or stderr closed early.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.stdout.buffer().is_abandoned() || self.stderr.buffer().is_abandoned()
    }

    pub(crate) fn stdin_slot(&self) -> Result<&AsyncMutex<Option<ChildStdin>>, RunError> {
        self.stdin.get().ok_or_else(|| RunError::StdinUnavailable {
            reason: "stdin was not kept open when the process started".to_string(),
        })
    }

    /// Publish the final result and close every channel.
    pub(crate) fn finish(&self, outcome: Outcome) {
        match &outcome {
            Ok(output) => debug!(handle = self.id, code = output.status.code, "Process finished"),
            Err(error) => debug!(handle = self.id, code = error.status().code, "Process failed"),
        }
        self.outcome.send_replace(Some(outcome));
        for buffer in self.buffers() {
            buffer.close();
        }
        self.set_lifecycle(Lifecycle::Draining);
        self.finished.store(true, Ordering::SeqCst);
        self.try_close();
    }

    /// Move to `Closed` once the process is finished and no view is held.
    pub(crate) fn try_close(&self) {
        if !self.finished.load(Ordering::SeqCst) {
            return;
        }
        let held = [&self.stdout, &self.stderr, &self.combined]
            .iter()
            .any(|view| view.lock_state() == LockState::Locked);
        if !held {
            self.set_lifecycle(Lifecycle::Closed);
        }
    }

    pub(crate) fn add_link(&self, link: watch::Receiver<LinkState>) {
        lock(&self.links).push(link);
    }
}

impl fmt::Debug for HandleInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleInner")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("lifecycle", &*self.lifecycle.borrow())
            .finish_non_exhaustive()
    }
}

/// A lazily started shell command.
///
/// Nothing runs until the handle is awaited, one of its channels is read or
/// piped, or [`start`](Self::start) is called. Clones share the same process;
/// only the throw mode differs per clone (see [`no_throw`](Self::no_throw)).
///
/// Awaiting the handle yields the [`ProcessOutput`]. A non-zero exit fails
/// with [`RunError::Process`] unless throwing is disabled, in which case the
/// failed output is returned as a value.
#[derive(Clone)]
pub struct ProcessHandle {
    pub(crate) inner: Arc<HandleInner>,
    throw_errors: Option<bool>,
}

impl ProcessHandle {
    /// Create a handle for `command` using the given configuration.
    ///
    /// The configuration is read when the process starts, not now.
    #[track_caller]
    pub fn new(command: impl Into<Command>, config: SharedConfig) -> Self {
        Self::with_location(command.into(), config, Location::caller())
    }

    pub(crate) fn with_location(
        command: Command,
        config: SharedConfig,
        location: &'static Location<'static>,
    ) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::Unstarted);
        let (outcome, _) = watch::channel(None);
        let inner = HandleInner {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            command,
            config,
            snapshot: OnceLock::new(),
            location,
            start: Mutex::new(StartState::default()),
            policy: Mutex::new(Policy::default()),
            lifecycle,
            outcome,
            pid: AtomicU32::new(0),
            group: AtomicU32::new(0),
            retries: AtomicU32::new(0),
            killed: AtomicBool::new(false),
            kill_token: CancellationToken::new(),
            attempt_killed: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            stdout: ViewShared::new(Channel::Stdout, ChannelBuffer::new()),
            stderr: ViewShared::new(Channel::Stderr, ChannelBuffer::new()),
            combined: ViewShared::new(Channel::Combined, ChannelBuffer::new()),
            stdin: OnceLock::new(),
            links: Mutex::new(Vec::new()),
            upstream: Mutex::new(None),
        };
        Self {
            inner: Arc::new(inner),
            throw_errors: None,
        }
    }

    /// Process-unique handle number, also recorded on the `process` span.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn command(&self) -> &Command {
        &self.inner.command
    }

    /// Where the handle was created.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.inner.location
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        *self.inner.lifecycle.borrow()
    }

    /// Retries performed so far.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.inner.retries.load(Ordering::SeqCst)
    }

    /// Whether [`kill`](Self::kill) was called on a running process.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.inner.is_killed()
    }

    /// Configuration the process was started with, or the current one if it
    /// has not started yet.
    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        self.inner
            .snapshot
            .get()
            .cloned()
            .unwrap_or_else(|| self.inner.config.current())
    }

    /// Id of the current attempt's shell process, starting it if needed.
    ///
    /// # Errors
    ///
    /// The spawn failure, if the shell could not be started.
    pub fn pid(&self) -> Result<u32, RunError> {
        self.ensure_started()?;
        match self.inner.pid.load(Ordering::SeqCst) {
            0 => match &*self.inner.outcome.borrow() {
                Some(Err(error)) => Err(error.clone().into()),
                _ => Err(RunError::NotStarted),
            },
            pid => Ok(pid),
        }
    }

    // ========================================================================
    // Channels
    // ========================================================================

    #[must_use]
    pub fn stdout(&self) -> ChannelView {
        ChannelView::new(self.clone(), Arc::clone(&self.inner.stdout))
    }

    #[must_use]
    pub fn stderr(&self) -> ChannelView {
        ChannelView::new(self.clone(), Arc::clone(&self.inner.stderr))
    }

    /// Lines of both channels interleaved in the order they were observed.
    #[must_use]
    pub fn combined(&self) -> ChannelView {
        ChannelView::new(self.clone(), Arc::clone(&self.inner.combined))
    }

    /// Iterate stdout lines.
    pub fn lines(&self) -> Result<LineReader, RunError> {
        self.stdout().lines()
    }

    /// Claim the process's stdin.
    ///
    /// Unclaimed stdin is closed as soon as the process starts, so this must
    /// be called first to keep it open.
    ///
    /// # Errors
    ///
    /// [`RunError::StdinUnavailable`] if the process already started without
    /// stdin being claimed.
    pub fn stdin(&self) -> Result<StdinWriter, RunError> {
        self.claim_stdin()?;
        Ok(StdinWriter::new(self.clone()))
    }

    pub(crate) fn claim_stdin(&self) -> Result<(), RunError> {
        let mut start = lock(&self.inner.start);
        if start.started && !start.stdin_claimed {
            return Err(RunError::StdinUnavailable {
                reason: "stdin was closed when the process started".to_string(),
            });
        }
        start.stdin_claimed = true;
        Ok(())
    }

    /// Stdout to `target`. See [`PipeTarget`] for what can be piped into.
    #[track_caller]
    pub fn pipe<T: PipeTarget>(&self, target: T) -> Result<T::Output, RunError> {
        self.stdout().pipe(target)
    }

    /// Stdout through a consumer that produces a new stream.
    #[track_caller]
    pub fn pipe_through<T: PipeThrough>(&self, target: T) -> Result<T::Output, RunError> {
        self.stdout().pipe_through(target)
    }

    /// A new handle sharing this one's configuration and throw mode.
    pub(crate) fn derive(&self, command: Command, location: &'static Location<'static>) -> Self {
        let mut handle = Self::with_location(command, self.inner.config.clone(), location);
        handle.throw_errors = self.throw_errors;
        handle
    }

    pub(crate) fn set_upstream(&self, upstream: ProcessHandle) {
        *lock(&self.inner.upstream) = Some(upstream);
    }

    // ========================================================================
    // Policy
    // ========================================================================

    /// A handle to the same process whose failures resolve as values.
    #[must_use]
    pub fn no_throw(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            throw_errors: Some(false),
        }
    }

    /// Whether awaiting this handle fails on a non-zero exit.
    #[must_use]
    pub fn throws(&self) -> bool {
        self.throw_errors.unwrap_or_else(|| self.config().throw_errors)
    }

    /// Retry failed attempts, by count (`retry(3)`) or with a [`RetryPolicy`].
    ///
    /// Only the first attempt reads stdin. Later attempts run with stdin on
    /// `/dev/null`, so a retried pipeline destination does not see its input
    /// again.
    ///
    /// Ignored with a warning once the process has started.
    #[must_use]
    pub fn retry(self, policy: impl Into<RetryPolicy>) -> Self {
        let policy = policy.into();
        self.update_policy("retry", |p| p.retry = policy);
        self
    }

    /// Retry while `predicate` accepts the latest failure.
    #[must_use]
    pub fn retry_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&ProcessError) -> bool + Send + Sync + 'static,
    {
        self.retry(RetryPolicy::when(predicate))
    }

    /// Pause between a failure and the next attempt.
    #[must_use]
    pub fn delay(self, delay: Duration) -> Self {
        self.update_policy("delay", |p| p.delay = delay);
        self
    }

    /// Per-attempt limit; on expiry the process group receives SIGTERM.
    #[must_use]
    pub fn timeout(self, timeout: Duration) -> Self {
        self.update_policy("timeout", |p| p.timeout = Some(timeout));
        self
    }

    fn update_policy(&self, setting: &str, change: impl FnOnce(&mut Policy)) {
        let start = lock(&self.inner.start);
        if start.started {
            warn!(
                handle = self.inner.id,
                setting, "Process already started; ignoring policy change"
            );
            return;
        }
        change(&mut lock(&self.inner.policy));
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Spawn the process now instead of on first use. Idempotent.
    ///
    /// # Errors
    ///
    /// [`RunError::NoRuntime`] outside a Tokio runtime. A shell that fails to
    /// spawn is not an error here; it surfaces when the handle is awaited.
    pub fn start(&self) -> Result<(), RunError> {
        self.ensure_started()
    }

    pub(crate) fn ensure_started(&self) -> Result<(), RunError> {
        let inner = &self.inner;
        let mut start = lock(&inner.start);
        if start.started {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RunError::NoRuntime)?;
        start.started = true;

        let config = inner.config.current();
        let _ = inner.snapshot.set(Arc::clone(&config));
        let policy = lock(&inner.policy).clone();

        if config.verbose.echo_commands() {
            eprintln!("$ {}", inner.command);
        }

        match driver::spawn_attempt(inner, &config, start.stdin_claimed) {
            Ok(child) => {
                inner.set_lifecycle(Lifecycle::Running);
                runtime.spawn(driver::drive(Arc::clone(inner), child, config, policy));
            }
            Err(error) => {
                warn!(handle = inner.id, command = %inner.command, %error, "Failed to spawn process");
                inner.finish(Err(ProcessError::spawn(
                    inner.command.as_str(),
                    &error,
                    0,
                    inner.location,
                )));
            }
        }
        Ok(())
    }

    /// Deliver `signal` to the process group now.
    ///
    /// Killing stops further retries, and a kill during the delay between
    /// attempts ends the wait at once. A process that already finished is
    /// left alone.
    ///
    /// # Errors
    ///
    /// [`RunError::NotStarted`] before the process was spawned.
    pub fn kill(&self, signal: Signal) -> Result<(), RunError> {
        if !lock(&self.inner.start).started {
            return Err(RunError::NotStarted);
        }
        if self.inner.finished.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.killed.store(true, Ordering::SeqCst);
        self.inner.kill_token.cancel();
        let pid = self.inner.group.load(Ordering::SeqCst);
        if pid == 0 {
            debug!(handle = self.inner.id, "Killed between attempts");
            return Ok(());
        }

        self.inner.attempt_killed.store(true, Ordering::SeqCst);
        debug!(handle = self.inner.id, pid, %signal, "Sending signal to process group");
        signal_group(pid, signal)?;
        Ok(())
    }

    /// Wait until the process exited, output was delivered, and every view
    /// was released.
    pub async fn closed(&self) -> Result<(), RunError> {
        if !lock(&self.inner.start).started {
            return Err(RunError::NotStarted);
        }
        let mut rx = self.inner.lifecycle.subscribe();
        let _ = rx.wait_for(|state| *state == Lifecycle::Closed).await;
        Ok(())
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Run to completion and collect the output.
    ///
    /// # Errors
    ///
    /// [`RunError::Process`] on failure when this handle throws; a failing
    /// upstream process in a pipeline counts as a failure too.
    pub async fn output(&self) -> Result<ProcessOutput, RunError> {
        match self.settled().await? {
            Ok(output) => Ok(output),
            Err(error) if self.throws() => Err(error.into()),
            Err(error) => Ok(error.into_output()),
        }
    }

    /// Final status, never failing on a non-zero exit.
    pub async fn status(&self) -> Result<ProcessStatus, RunError> {
        let outcome = self.own_outcome().await?;
        Ok(match outcome {
            Ok(output) => output.status,
            Err(error) => error.status(),
        })
    }

    pub async fn status_code(&self) -> Result<i32, RunError> {
        Ok(self.status().await?.code)
    }

    async fn own_outcome(&self) -> Result<Outcome, RunError> {
        self.ensure_started()?;
        let mut rx = self.inner.outcome.subscribe();
        let outcome = {
            let published = rx
                .wait_for(Option::is_some)
                .await
                .map_err(|_| RunError::NotStarted)?;
            (*published).clone()
        };
        outcome.ok_or(RunError::NotStarted)
    }

    /// Own outcome after attached tasks finish, with an upstream failure
    /// taking over a successful result.
    pub(crate) fn settled(&self) -> BoxFuture<'static, Result<Outcome, RunError>> {
        let this = self.clone();
        async move {
            let outcome = this.own_outcome().await?;
            this.join_links().await?;

            let upstream = lock(&this.inner.upstream).clone();
            let Some(upstream) = upstream else {
                return Ok(outcome);
            };
            let upstream_outcome = upstream.settled().await?;
            match (outcome, upstream_outcome) {
                (Ok(output), Err(error)) if upstream.inner.is_abandoned() => {
                    debug!(
                        handle = upstream.id(),
                        code = error.status().code,
                        "Ignoring upstream failure after its consumer closed early"
                    );
                    Ok(Ok(output))
                }
                (Ok(_), Err(error)) => Ok(Err(error)),
                (outcome, _) => Ok(outcome),
            }
        }
        .boxed()
    }

    async fn join_links(&self) -> Result<(), RunError> {
        let links: Vec<_> = lock(&self.inner.links).clone();
        for mut link in links {
            let state = {
                match link.wait_for(Option::is_some).await {
                    Ok(state) => (*state).clone(),
                    Err(_) => None,
                }
            };
            if let Some(Err(reason)) = state {
                return Err(RunError::Pipe { reason });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.inner.id)
            .field("command", &self.inner.command.as_str())
            .field("lifecycle", &self.lifecycle())
            .field("throw_errors", &self.throw_errors)
            .finish()
    }
}

impl IntoFuture for ProcessHandle {
    type Output = Result<ProcessOutput, RunError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.output().await }.boxed()
    }
}
