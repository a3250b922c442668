//! The task that owns a running child: attempts, drains, timeouts, retries.

use bytes::Bytes;
use dzx_config::{Config, StdioMode};
use dzx_streams::{ChunkSplitter, LineSplitter};
use dzx_utils::ExitCode;
use dzx_utils::logging::process_span;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tracing::{Instrument, debug, info, warn};

use crate::error::ProcessError;
use crate::output::{ProcessOutput, ProcessStatus};
use crate::policy::Policy;
use crate::process::{HandleInner, Lifecycle, Outcome};
use crate::signal::{Signal, signal_group};
use crate::view::Channel;

const READ_CHUNK_SIZE: usize = 8192;

/// How long output may keep flowing after a killed process exits.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// How long a timed-out process gets between SIGTERM and SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn stdio(mode: StdioMode) -> Stdio {
    match mode {
        StdioMode::Piped => Stdio::piped(),
        StdioMode::Inherit => Stdio::inherit(),
        StdioMode::Null => Stdio::null(),
    }
}

/// Spawn one attempt: `<shell> -c "<prefix> <command>"` in its own process
/// group. Stdin is only piped when `keep_stdin` is set.
pub(crate) fn spawn_attempt(
    inner: &HandleInner,
    config: &Config,
    keep_stdin: bool,
) -> std::io::Result<Child> {
    let mut cmd = tokio::process::Command::new(&config.shell);
    cmd.arg("-c")
        .arg(config.shell_script(inner.command.as_str()))
        .stdin(if keep_stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(stdio(config.stdout))
        .stderr(stdio(config.stderr));

    // Set process group for killpg support
    unsafe {
        cmd.pre_exec(|| {
            libc::setpgid(0, 0);
            Ok(())
        });
    }

    let mut child = cmd.spawn()?;
    let pid = child.id().unwrap_or_default();
    inner.pid.store(pid, std::sync::atomic::Ordering::SeqCst);
    inner.group.store(pid, std::sync::atomic::Ordering::SeqCst);
    inner
        .attempt_killed
        .store(false, std::sync::atomic::Ordering::SeqCst);

    if let Some(stdin) = child.stdin.take() {
        let _ = inner.stdin.set(tokio::sync::Mutex::new(Some(stdin)));
    }

    info!(handle = inner.id, pid, command = %inner.command, "Spawned process");
    Ok(child)
}

/// Drive the process to its final outcome and publish it.
pub(crate) async fn drive(inner: Arc<HandleInner>, child: Child, config: Arc<Config>, policy: Policy) {
    let span = process_span(inner.id, inner.command.as_str());
    async {
        let outcome = run_attempts(&inner, child, &config, &policy).await;
        inner.finish(outcome);
    }
    .instrument(span)
    .await;
}

async fn run_attempts(inner: &HandleInner, mut child: Child, config: &Config, policy: &Policy) -> Outcome {
    let mut retries = 0;
    loop {
        let output = run_attempt(inner, &mut child, config, policy.timeout, retries).await;
        if output.status.success {
            return Ok(output);
        }

        let error = ProcessError::from_output(inner.command.as_str(), output, inner.location);
        if inner.is_killed() {
            debug!(handle = inner.id, "Process was killed; not retrying");
            return Err(error);
        }
        if !policy.retry.should_retry(&error) {
            return Err(error);
        }

        debug!(
            handle = inner.id,
            retries = retries + 1,
            code = error.status().code,
            delay = ?policy.delay,
            "Retrying failed process"
        );
        if !policy.delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(policy.delay) => {}
                () = inner.kill_token.cancelled() => {}
            }
        }
        if inner.is_killed() {
            debug!(handle = inner.id, "Process was killed during retry delay");
            return Err(error);
        }

        retries += 1;
        inner.set_retries(retries);
        for buffer in inner.buffers() {
            buffer.end_attempt();
        }

        child = match spawn_attempt(inner, config, false) {
            Ok(child) => child,
            Err(spawn_error) => {
                warn!(handle = inner.id, error = %spawn_error, "Failed to respawn process");
                return Err(ProcessError::spawn(
                    inner.command.as_str(),
                    &spawn_error,
                    retries,
                    inner.location,
                ));
            }
        };
        inner.set_lifecycle(Lifecycle::Running);
        if inner.is_killed() {
            // The kill landed between the delay and the respawn.
            inner
                .attempt_killed
                .store(true, std::sync::atomic::Ordering::SeqCst);
            let pid = inner.group.load(std::sync::atomic::Ordering::SeqCst);
            if let Err(error) = signal_group(pid, Signal::SIGKILL) {
                warn!(handle = inner.id, pid, %error, "Failed to signal respawned process");
            }
        }
    }
}

/// Bytes of one attempt.
#[derive(Debug, Default)]
struct AttemptCapture {
    stdout: Mutex<Vec<u8>>,
    stderr: Mutex<Vec<u8>>,
    combined: Mutex<Vec<u8>>,
}

impl AttemptCapture {
    fn text(buffer: &Mutex<Vec<u8>>) -> String {
        String::from_utf8_lossy(&lock(buffer)).into_owned()
    }
}

async fn run_attempt(
    inner: &HandleInner,
    child: &mut Child,
    config: &Config,
    timeout: Option<Duration>,
    retries: u32,
) -> ProcessOutput {
    let capture = AttemptCapture::default();
    let echo = config.verbose.echo_output();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let drains = futures::future::join(
        drain(stdout, Channel::Stdout, inner, &capture, echo),
        drain(stderr, Channel::Stderr, inner, &capture, echo),
    );
    let wait = wait_attempt(inner, child, timeout);
    tokio::pin!(drains);
    tokio::pin!(wait);

    let mut exit = None;
    let mut drained = false;
    let status = loop {
        tokio::select! {
            status = &mut wait, if exit.is_none() => {
                inner.set_lifecycle(Lifecycle::Draining);
                exit = Some(status);
            }
            _ = &mut drains, if !drained => drained = true,
        }

        if let Some(status) = exit {
            if drained {
                break status;
            }
            if inner.attempt_killed.load(std::sync::atomic::Ordering::SeqCst) {
                if tokio::time::timeout(DRAIN_GRACE, &mut drains).await.is_err() {
                    debug!(handle = inner.id, "Output still open after kill; abandoning drain");
                }
                break status;
            }
        }
    };

    inner.group.store(0, std::sync::atomic::Ordering::SeqCst);

    ProcessOutput {
        stdout: AttemptCapture::text(&capture.stdout),
        stderr: AttemptCapture::text(&capture.stderr),
        combined: AttemptCapture::text(&capture.combined),
        status,
        retries,
    }
}

async fn wait_attempt(inner: &HandleInner, child: &mut Child, timeout: Option<Duration>) -> ProcessStatus {
    let result = match timeout {
        None => child.wait().await,
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(handle = inner.id, timeout = ?limit, "Process timed out; terminating");
                terminate(inner, child).await
            }
        },
    };

    match result {
        Ok(status) => status.into(),
        Err(error) => {
            warn!(handle = inner.id, %error, "Failed to wait for process");
            ProcessStatus::exited(ExitCode::FAILURE.as_i32())
        }
    }
}

/// SIGTERM the group, escalating to SIGKILL if it outlives the grace period.
async fn terminate(inner: &HandleInner, child: &mut Child) -> std::io::Result<ExitStatus> {
    inner
        .attempt_killed
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let pid = inner.pid.load(std::sync::atomic::Ordering::SeqCst);

    if let Err(error) = signal_group(pid, Signal::SIGTERM) {
        warn!(handle = inner.id, pid, %error, "Failed to send SIGTERM");
    }
    match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(result) => result,
        Err(_) => {
            warn!(handle = inner.id, pid, "Process ignored SIGTERM; sending SIGKILL");
            if let Err(error) = signal_group(pid, Signal::SIGKILL) {
                warn!(handle = inner.id, pid, %error, "Failed to send SIGKILL");
            }
            child.wait().await
        }
    }
}

/// Copy one pipe into its channel store, the attempt capture, and the
/// combined channel until end of file or until its consumer goes away.
async fn drain<R>(
    pipe: Option<R>,
    channel: Channel,
    inner: &HandleInner,
    capture: &AttemptCapture,
    echo: bool,
) where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return;
    };
    let (store, captured) = match channel {
        Channel::Stdout => (inner.stdout.buffer(), &capture.stdout),
        Channel::Stderr => (inner.stderr.buffer(), &capture.stderr),
        Channel::Combined => return,
    };

    let mut lines = ChunkSplitter::new(LineSplitter::keep_line_breaks());
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let read = tokio::select! {
            read = pipe.read(&mut buf) => read,
            () = store.abandoned().cancelled() => {
                debug!(handle = inner.id, %channel, "Consumer closed early; closing pipe");
                break;
            }
        };

        match read {
            Ok(0) => break,
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                lock(captured).extend_from_slice(&chunk);
                if echo {
                    echo_chunk(channel, &chunk).await;
                }
                match lines.feed(&chunk) {
                    Ok(complete) => push_combined(inner, capture, complete),
                    Err(error) => warn!(handle = inner.id, %error, "Failed to split output"),
                }
                store.push(chunk);
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => {
                warn!(handle = inner.id, %channel, %error, "Failed to read process output");
                break;
            }
        }
    }

    if let Ok(rest) = lines.finish() {
        let partial = rest.last().is_some_and(|line| !line.ends_with(b"\n"));
        push_combined(inner, capture, rest);
        if partial {
            inner.combined.buffer().end_line();
        }
    }
}

fn push_combined(inner: &HandleInner, capture: &AttemptCapture, lines: Vec<Bytes>) {
    for line in lines {
        lock(&capture.combined).extend_from_slice(&line);
        inner.combined.buffer().push(line);
    }
}

/// Mirror live output to the host's own streams.
async fn echo_chunk(channel: Channel, chunk: &[u8]) {
    let result = match channel {
        Channel::Stderr => {
            let mut stderr = tokio::io::stderr();
            match stderr.write_all(chunk).await {
                Ok(()) => stderr.flush().await,
                Err(error) => Err(error),
            }
        }
        _ => {
            let mut stdout = tokio::io::stdout();
            match stdout.write_all(chunk).await {
                Ok(()) => stdout.flush().await,
                Err(error) => Err(error),
            }
        }
    };
    if let Err(error) = result {
        debug!(%error, "Failed to echo process output");
    }
}
