//! Append-only chunk store backing a channel.
//!
//! The driver pushes every chunk a stream produces; any number of cursors
//! replay the history from the start and then follow live output until the
//! store is closed.

use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// One entry in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Data(Bytes),
    /// The attempt that produced the preceding data ended; a retry follows.
    AttemptEnd,
    /// The preceding data ends a line that had no line break.
    LineEnd,
}

#[derive(Debug, Default)]
struct BufferState {
    segments: Vec<Segment>,
    closed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ChannelBuffer {
    state: Mutex<BufferState>,
    notify: Notify,
    abandoned: CancellationToken,
}

impl ChannelBuffer {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.append(Segment::Data(chunk));
    }

    pub(crate) fn end_attempt(&self) {
        self.append(Segment::AttemptEnd);
    }

    pub(crate) fn end_line(&self) {
        self.append(Segment::LineEnd);
    }

    fn append(&self, segment: Segment) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.segments.push(segment);
        }
        self.notify.notify_waiters();
    }

    /// No more segments will arrive; idempotent.
    pub(crate) fn close(&self) {
        self.state().closed = true;
        self.notify.notify_waiters();
    }

    /// A downstream consumer went away; the producer may stop reading.
    pub(crate) fn abandon(&self) {
        self.abandoned.cancel();
    }

    pub(crate) fn abandoned(&self) -> &CancellationToken {
        &self.abandoned
    }

    pub(crate) fn is_abandoned(&self) -> bool {
        self.abandoned.is_cancelled()
    }

    pub(crate) fn cursor(self: &Arc<Self>) -> BufferCursor {
        BufferCursor {
            buffer: Arc::clone(self),
            position: 0,
        }
    }
}

/// Independent read position over a [`ChannelBuffer`].
#[derive(Debug)]
pub(crate) struct BufferCursor {
    buffer: Arc<ChannelBuffer>,
    position: usize,
}

impl BufferCursor {
    /// Next segment, waiting for the producer if none is buffered.
    ///
    /// Returns `None` once the store is closed and fully consumed.
    pub(crate) async fn next(&mut self) -> Option<Segment> {
        loop {
            let notified = self.buffer.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the
            // await is not missed.
            notified.as_mut().enable();

            {
                let state = self.buffer.state();
                if let Some(segment) = state.segments.get(self.position) {
                    self.position += 1;
                    return Some(segment.clone());
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Next data chunk, skipping attempt and line boundaries.
    pub(crate) async fn next_data(&mut self) -> Option<Bytes> {
        loop {
            match self.next().await? {
                Segment::Data(bytes) => return Some(bytes),
                Segment::AttemptEnd | Segment::LineEnd => continue,
            }
        }
    }
}
