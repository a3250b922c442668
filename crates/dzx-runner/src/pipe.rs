//! Connecting a channel to sinks, processes, and transforms.

use bytes::Bytes;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::debug;

use crate::buffer::ChannelBuffer;
use crate::command::Command;
use crate::error::RunError;
use crate::process::ProcessHandle;
use crate::stdin::StdinWriter;
use crate::view::{Channel, ChannelView, LockState, ViewGuard, ViewShared};

const READ_CHUNK_SIZE: usize = 8192;

/// The channel being piped, handed to [`PipeTarget::connect`].
#[derive(Debug, Clone)]
pub struct PipeSource {
    owner: ProcessHandle,
    view: Arc<ViewShared>,
}

impl PipeSource {
    pub(crate) fn new(owner: ProcessHandle, view: Arc<ViewShared>) -> Self {
        Self { owner, view }
    }

    #[must_use]
    pub fn channel(&self) -> Channel {
        self.view.channel()
    }

    #[must_use]
    pub fn owner(&self) -> &ProcessHandle {
        &self.owner
    }

    fn ensure_available(&self) -> Result<(), RunError> {
        if self.view.lock_state() == LockState::Unconsumed {
            Ok(())
        } else {
            Err(RunError::AlreadyConsumed {
                channel: self.channel(),
            })
        }
    }

    fn lock(&self) -> Result<ViewGuard, RunError> {
        ViewGuard::acquire(&self.view, &self.owner.inner)
    }

    /// Tell the producing pipes that nobody reads this channel any more.
    fn abandon(&self) {
        let inner = &self.owner.inner;
        match self.channel() {
            Channel::Stdout => inner.stdout.buffer().abandon(),
            Channel::Stderr => inner.stderr.buffer().abandon(),
            Channel::Combined => {
                inner.stdout.buffer().abandon();
                inner.stderr.buffer().abandon();
            }
        }
    }
}

/// Something a channel can be piped into.
///
/// - [`Sink`]: a tee. The channel keeps its other consumers and `pipe`
///   returns the source handle, which completes once the sink was written.
/// - [`ProcessHandle`], [`Command`], `&str`: a handoff. The channel is locked
///   and fed to the destination's stdin, and `pipe` returns the destination.
///   Awaiting it completes the whole chain and reports the destination's
///   failure first, then the upstream's.
/// - [`Transform`]: a handoff through a duplex stream; `pipe` returns a view
///   of what the stream produces.
pub trait PipeTarget {
    type Output;

    fn connect(self, source: PipeSource) -> Result<Self::Output, RunError>;
}

/// Targets that consume the channel and produce a new stream.
pub trait PipeThrough: PipeTarget {}

/// Run `task` on the current runtime and make `owner` wait for it on
/// completion.
fn spawn_link<F>(owner: &ProcessHandle, task: F) -> Result<(), RunError>
where
    F: Future<Output = Result<(), String>> + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| RunError::NoRuntime)?;
    let (tx, rx) = watch::channel(None);
    owner.inner.add_link(rx);
    runtime.spawn(async move {
        let result = task.await;
        tx.send_replace(Some(result));
    });
    Ok(())
}

/// Tee a channel into an async writer.
///
/// The writer is flushed and dropped when the channel ends, never shut down,
/// so host streams such as `tokio::io::stdout()` stay usable.
#[derive(Debug)]
pub struct Sink<W>(W);

impl<W> Sink<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self(writer)
    }
}

impl<W> PipeTarget for Sink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Output = ProcessHandle;

    fn connect(self, source: PipeSource) -> Result<ProcessHandle, RunError> {
        source.owner.ensure_started()?;
        let mut cursor = source.view.buffer().cursor();
        let mut writer = self.0;
        let channel = source.channel();
        let handle = source.owner.id();

        spawn_link(&source.owner, async move {
            while let Some(chunk) = cursor.next_data().await {
                if let Err(error) = writer.write_all(&chunk).await {
                    if error.kind() == std::io::ErrorKind::BrokenPipe {
                        debug!(handle, %channel, "Sink closed early");
                        return Ok(());
                    }
                    return Err(format!("writing {channel} to sink: {error}"));
                }
            }
            match writer.flush().await {
                Err(error) if error.kind() != std::io::ErrorKind::BrokenPipe => {
                    Err(format!("flushing {channel} sink: {error}"))
                }
                _ => Ok(()),
            }
        })?;

        Ok(source.owner)
    }
}

impl PipeTarget for ProcessHandle {
    type Output = ProcessHandle;

    fn connect(self, source: PipeSource) -> Result<ProcessHandle, RunError> {
        source.ensure_available()?;
        self.claim_stdin()?;
        source.owner.ensure_started()?;
        self.ensure_started()?;
        let guard = source.lock()?;
        self.set_upstream(source.owner.clone());

        let mut cursor = source.view.buffer().cursor();
        let writer = StdinWriter::new(self.clone());
        let dest = self.id();

        spawn_link(&self, async move {
            let _guard = guard;
            while let Some(chunk) = cursor.next_data().await {
                match writer.write(&chunk).await {
                    Ok(()) => {}
                    Err(RunError::StdinUnavailable { reason }) => {
                        debug!(handle = dest, %reason, "Downstream stopped reading");
                        source.abandon();
                        break;
                    }
                    Err(error) => return Err(error.to_string()),
                }
            }
            writer.close().await.map_err(|error| error.to_string())
        })?;

        Ok(self)
    }
}

impl PipeThrough for ProcessHandle {}

impl PipeTarget for Command {
    type Output = ProcessHandle;

    #[track_caller]
    fn connect(self, source: PipeSource) -> Result<ProcessHandle, RunError> {
        let dest = source.owner.derive(self, Location::caller());
        dest.connect(source)
    }
}

impl PipeThrough for Command {}

impl PipeTarget for &str {
    type Output = ProcessHandle;

    #[track_caller]
    fn connect(self, source: PipeSource) -> Result<ProcessHandle, RunError> {
        Command::new(self).connect(source)
    }
}

impl PipeThrough for &str {}

/// Hand a channel to a duplex stream and read back what it produces.
///
/// Everything the channel yields is written to the stream, which is shut
/// down at the end; the returned view reads the stream's output.
#[derive(Debug)]
pub struct Transform<T>(T);

impl<T> Transform<T> {
    #[must_use]
    pub fn new(stream: T) -> Self {
        Self(stream)
    }
}

impl<T> PipeTarget for Transform<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    type Output = ChannelView;

    fn connect(self, source: PipeSource) -> Result<ChannelView, RunError> {
        source.ensure_available()?;
        source.owner.ensure_started()?;
        let guard = source.lock()?;

        let (mut reader, mut writer) = tokio::io::split(self.0);
        let produced = ChannelBuffer::new();
        let view = ViewShared::new(source.channel(), Arc::clone(&produced));
        let mut cursor = source.view.buffer().cursor();
        let channel = source.channel();
        let feeder_source = source.clone();

        spawn_link(&source.owner, async move {
            let _guard = guard;
            while let Some(chunk) = cursor.next_data().await {
                if let Err(error) = writer.write_all(&chunk).await {
                    if error.kind() == std::io::ErrorKind::BrokenPipe {
                        debug!(%channel, "Transform stopped reading");
                        feeder_source.abandon();
                        break;
                    }
                    return Err(format!("writing {channel} to transform: {error}"));
                }
            }
            match writer.shutdown().await {
                Err(error) if error.kind() != std::io::ErrorKind::BrokenPipe => {
                    Err(format!("closing transform input: {error}"))
                }
                _ => Ok(()),
            }
        })?;

        spawn_link(&source.owner, async move {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            let result = loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break Ok(()),
                    Ok(n) => produced.push(Bytes::copy_from_slice(&buf[..n])),
                    Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(error) => break Err(format!("reading transform output: {error}")),
                }
            };
            produced.close();
            result
        })?;

        Ok(ChannelView::new(source.owner, view))
    }
}

impl<T> PipeThrough for Transform<T> where T: AsyncRead + AsyncWrite + Send + 'static {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shell;
    use dzx_config::Config;
    use std::time::Duration;

    fn shell() -> Shell {
        Shell::new(Config::builder().verbose(0).build().unwrap())
    }

    #[tokio::test]
    async fn test_sink_tees_stdout() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        let handle = shell().spawn("printf 1; printf 2 >&2; printf 3;");

        let output = handle.pipe(Sink::new(writer)).unwrap().output().await.unwrap();
        let mut teed = String::new();
        reader.read_to_string(&mut teed).await.unwrap();

        assert_eq!(teed, "13");
        assert_eq!(output.stdout, "13");
        // A tee does not consume the view.
        assert_eq!(handle.stdout().read().await.unwrap(), "13");
    }

    #[tokio::test]
    async fn test_sink_from_stderr() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        let handle = shell().spawn("printf 1; printf 2 >&2; printf 3; printf 4 >&2");

        handle.stderr().pipe(Sink::new(writer)).unwrap().output().await.unwrap();
        let mut teed = String::new();
        reader.read_to_string(&mut teed).await.unwrap();
        assert_eq!(teed, "24");
    }

    #[tokio::test]
    async fn test_sink_into_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("out.txt");
        let file = tokio::fs::File::create(&path).await.unwrap();

        shell().spawn("seq 1 3").pipe(Sink::new(file)).unwrap().output().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n2\n3\n");
    }

    #[tokio::test]
    async fn test_pipe_into_command() {
        let output = shell()
            .spawn("echo foo; echo bar >&2")
            .pipe("cat")
            .unwrap()
            .output()
            .await
            .unwrap();
        assert_eq!(output.stdout, "foo\n");
        assert_eq!(output.stderr, "");
    }

    #[tokio::test]
    async fn test_pipe_combined_into_command() {
        let output = shell()
            .spawn("echo foo; echo bar >&2")
            .combined()
            .pipe("sort")
            .unwrap()
            .output()
            .await
            .unwrap();
        assert_eq!(output.stdout, "bar\nfoo\n");
    }

    #[tokio::test]
    async fn test_pipe_into_handle_and_chain() {
        let shell = shell();
        let output = shell
            .spawn("printf 'b\\na\\nc\\n'")
            .pipe(shell.spawn("sort"))
            .unwrap()
            .pipe(Command::new("head -n 2"))
            .unwrap()
            .output()
            .await
            .unwrap();
        assert_eq!(output.stdout, "a\nb\n");
    }

    #[tokio::test]
    async fn test_handoff_locks_source() {
        let source = shell().spawn("echo x");
        let dest = source.pipe("cat").unwrap();

        assert!(matches!(
            source.stdout().lines(),
            Err(RunError::AlreadyConsumed { .. })
        ));
        assert!(matches!(
            source.pipe("cat"),
            Err(RunError::AlreadyConsumed { .. })
        ));
        assert_eq!(dest.output().await.unwrap().stdout, "x\n");
    }

    #[tokio::test]
    async fn test_upstream_failure_surfaces_through_chain() {
        let err = shell()
            .spawn("echo partial; exit 3")
            .pipe("cat")
            .unwrap()
            .output()
            .await
            .unwrap_err();
        let error = err.process_error().unwrap();
        assert_eq!(error.status().code, 3);
        assert_eq!(error.command(), "echo partial; exit 3");
    }

    #[tokio::test]
    async fn test_destination_failure_wins() {
        let err = shell()
            .spawn("exit 3")
            .pipe("cat >/dev/null; exit 4")
            .unwrap()
            .output()
            .await
            .unwrap_err();
        assert_eq!(err.process_error().unwrap().status().code, 4);
    }

    #[tokio::test]
    async fn test_retried_destination_reads_empty_stdin() {
        let shell = shell();
        let dest = shell.spawn("cat; exit 1").retry(1);
        let output = shell
            .spawn("echo hello")
            .pipe(dest.clone())
            .unwrap()
            .no_throw()
            .output()
            .await
            .unwrap();

        assert_eq!(output.retries, 1);
        assert_eq!(output.status.code, 1);
        assert_eq!(output.stdout, "");
        // The first attempt's input is still in the view's history.
        assert_eq!(dest.stdout().read().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_early_consumer_exit_is_not_a_failure() {
        let output = tokio::time::timeout(
            Duration::from_secs(10),
            shell().spawn("yes").pipe("head -n 1").unwrap().output(),
        )
        .await
        .expect("pipeline should finish once head exits")
        .unwrap();
        assert_eq!(output.stdout, "y\n");
    }

    #[tokio::test]
    async fn test_destination_already_started() {
        let shell = shell();
        let dest = shell.spawn("cat");
        dest.start().unwrap();
        assert!(matches!(
            shell.spawn("echo x").pipe(dest.clone()),
            Err(RunError::StdinUnavailable { .. })
        ));
        dest.output().await.unwrap();
    }

    #[tokio::test]
    async fn test_transform_produces_new_view() {
        let (local, mut remote) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut input = String::new();
            remote.read_to_string(&mut input).await.unwrap();
            remote.write_all(input.to_uppercase().as_bytes()).await.unwrap();
        });

        let handle = shell().spawn("echo hello; echo world");
        let view = handle.pipe_through(Transform::new(local)).unwrap();
        assert_eq!(view.read().await.unwrap(), "HELLO\nWORLD");
        assert!(matches!(
            handle.stdout().lines(),
            Err(RunError::AlreadyConsumed { .. })
        ));
    }
}
