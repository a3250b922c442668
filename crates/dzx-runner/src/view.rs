//! Line-oriented views over a process's output channels.

use dzx_streams::{ChunkSplitter, LineSplitter};
use futures::future::BoxFuture;
use futures::{FutureExt, Stream};
use std::collections::VecDeque;
use std::fmt;
use std::future::IntoFuture;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

use crate::buffer::{BufferCursor, ChannelBuffer, Segment};
use crate::error::RunError;
use crate::pipe::{PipeSource, PipeTarget, PipeThrough};
use crate::process::{HandleInner, ProcessHandle};

/// Which output a view reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Stdout,
    Stderr,
    /// Lines of stdout and stderr interleaved in observed order.
    Combined,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
            Self::Combined => write!(f, "combined"),
        }
    }
}

/// Consumption state of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unconsumed,
    /// A reader or a pipe currently holds the view.
    Locked,
    /// The single permitted consumer has finished or gone away.
    Exhausted,
}

#[derive(Debug)]
pub(crate) struct ViewShared {
    channel: Channel,
    buffer: Arc<ChannelBuffer>,
    state: Mutex<LockState>,
}

impl ViewShared {
    pub(crate) fn new(channel: Channel, buffer: Arc<ChannelBuffer>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            buffer,
            state: Mutex::new(LockState::Unconsumed),
        })
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn channel(&self) -> Channel {
        self.channel
    }

    pub(crate) fn buffer(&self) -> &Arc<ChannelBuffer> {
        &self.buffer
    }

    pub(crate) fn lock_state(&self) -> LockState {
        *self.state()
    }

    fn acquire(&self) -> Result<(), RunError> {
        let mut state = self.state();
        if *state != LockState::Unconsumed {
            return Err(RunError::AlreadyConsumed {
                channel: self.channel,
            });
        }
        *state = LockState::Locked;
        Ok(())
    }

    fn release(&self) {
        *self.state() = LockState::Exhausted;
    }
}

/// Exclusive hold on a view; releasing it marks the view exhausted.
#[derive(Debug)]
pub(crate) struct ViewGuard {
    shared: Arc<ViewShared>,
    owner: Arc<HandleInner>,
}

impl ViewGuard {
    pub(crate) fn acquire(shared: &Arc<ViewShared>, owner: &Arc<HandleInner>) -> Result<Self, RunError> {
        shared.acquire()?;
        Ok(Self {
            shared: Arc::clone(shared),
            owner: Arc::clone(owner),
        })
    }
}

impl Drop for ViewGuard {
    fn drop(&mut self) {
        self.shared.release();
        self.owner.try_close();
    }
}

/// A lazily started, single-consumer view of one output channel.
///
/// Creating a view does nothing; the owning process is spawned when the view
/// is read, piped, or awaited. Awaiting a view yields all of its lines joined
/// with `"\n"`, so a trailing newline does not survive.
#[derive(Debug, Clone)]
pub struct ChannelView {
    owner: ProcessHandle,
    shared: Arc<ViewShared>,
}

impl ChannelView {
    pub(crate) fn new(owner: ProcessHandle, shared: Arc<ViewShared>) -> Self {
        Self { owner, shared }
    }

    #[must_use]
    pub fn channel(&self) -> Channel {
        self.shared.channel
    }

    #[must_use]
    pub fn lock_state(&self) -> LockState {
        self.shared.lock_state()
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock_state() == LockState::Locked
    }

    /// The process this view reads from.
    #[must_use]
    pub fn owner(&self) -> &ProcessHandle {
        &self.owner
    }

    /// Take the view and iterate its lines, starting the process if needed.
    ///
    /// # Errors
    ///
    /// [`RunError::AlreadyConsumed`] if the view was read or piped before,
    /// [`RunError::NoRuntime`] if the process cannot be started here.
    pub fn lines(&self) -> Result<LineReader, RunError> {
        if self.lock_state() != LockState::Unconsumed {
            return Err(RunError::AlreadyConsumed {
                channel: self.channel(),
            });
        }
        self.owner.ensure_started()?;
        let guard = ViewGuard::acquire(&self.shared, &self.owner.inner)?;
        Ok(LineReader::new(self.shared.buffer.cursor(), guard))
    }

    /// Read every remaining line and join them with `"\n"`.
    ///
    /// Process failures never surface here; await the owner for those.
    pub async fn read(&self) -> Result<String, RunError> {
        let lines = self.lines()?.collect().await;
        Ok(lines.join("\n"))
    }

    /// Send this channel to `target`. See [`PipeTarget`] for the variants.
    #[track_caller]
    pub fn pipe<T: PipeTarget>(&self, target: T) -> Result<T::Output, RunError> {
        target.connect(self.source())
    }

    /// Hand this channel to a consumer that produces a new stream.
    #[track_caller]
    pub fn pipe_through<T: PipeThrough>(&self, target: T) -> Result<T::Output, RunError> {
        target.connect(self.source())
    }

    fn source(&self) -> PipeSource {
        PipeSource::new(self.owner.clone(), Arc::clone(&self.shared))
    }
}

impl IntoFuture for ChannelView {
    type Output = Result<String, RunError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.read().await }.boxed()
    }
}

/// Async line iterator over a channel.
///
/// Lines are split on `\n` with a preceding `\r` removed and decoded lossily
/// as UTF-8. A partial last line is yielded when the stream ends, and each
/// retry boundary ends the current line.
#[derive(Debug)]
pub struct LineReader {
    cursor: BufferCursor,
    splitter: ChunkSplitter<LineSplitter>,
    pending: VecDeque<String>,
    guard: Option<ViewGuard>,
}

impl LineReader {
    fn new(cursor: BufferCursor, guard: ViewGuard) -> Self {
        Self {
            cursor,
            splitter: ChunkSplitter::new(LineSplitter::new()),
            pending: VecDeque::new(),
            guard: Some(guard),
        }
    }

    /// Next line, or `None` once the channel is exhausted.
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(line);
            }
            if self.guard.is_none() {
                return None;
            }

            match self.cursor.next().await {
                Some(Segment::Data(chunk)) => {
                    let lines = self.splitter.feed(&chunk);
                    self.enqueue(lines);
                }
                Some(Segment::AttemptEnd | Segment::LineEnd) => {
                    let lines = self.splitter.finish();
                    self.enqueue(lines);
                }
                None => {
                    let lines = self.splitter.finish();
                    self.enqueue(lines);
                    self.guard = None;
                }
            }
        }
    }

    fn enqueue(&mut self, lines: std::io::Result<Vec<bytes::Bytes>>) {
        match lines {
            Ok(lines) => self.pending.extend(
                lines
                    .iter()
                    .map(|line| String::from_utf8_lossy(line).into_owned()),
            ),
            Err(error) => warn!(%error, "Failed to split channel output into lines"),
        }
    }

    /// Drain the remaining lines.
    pub async fn collect(mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await {
            lines.push(line);
        }
        lines
    }

    /// Adapt into a [`Stream`] of lines.
    pub fn into_stream(self) -> impl Stream<Item = String> + Send + 'static {
        futures::stream::unfold(self, |mut reader| async move {
            let line = reader.next_line().await?;
            Some((line, reader))
        })
    }
}
