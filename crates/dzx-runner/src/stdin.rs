use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::RunError;
use crate::process::ProcessHandle;

/// Writer for a process's stdin, obtained with [`ProcessHandle::stdin`].
///
/// Claiming stdin before the process starts keeps the pipe open after spawn;
/// the caller is then responsible for calling [`close`](Self::close).
#[derive(Debug, Clone)]
pub struct StdinWriter {
    handle: ProcessHandle,
}

impl StdinWriter {
    pub(crate) fn new(handle: ProcessHandle) -> Self {
        Self { handle }
    }

    /// Write all of `data`, starting the process if needed.
    ///
    /// # Errors
    ///
    /// [`RunError::StdinUnavailable`] once stdin was closed by [`close`](Self::close)
    /// or by the process exiting.
    pub async fn write(&self, data: impl AsRef<[u8]>) -> Result<(), RunError> {
        self.handle.ensure_started()?;
        let slot = self.handle.inner.stdin_slot()?;
        let mut pipe = slot.lock().await;
        let Some(stdin) = pipe.as_mut() else {
            return Err(RunError::StdinUnavailable {
                reason: "stdin has been closed".to_string(),
            });
        };

        match stdin.write_all(data.as_ref()).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!(handle = self.handle.id(), "Process closed its stdin");
                *pipe = None;
                Err(RunError::StdinUnavailable {
                    reason: "the process closed its stdin".to_string(),
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Flush and close stdin so the process sees end-of-file. Idempotent.
    pub async fn close(&self) -> Result<(), RunError> {
        self.handle.ensure_started()?;
        let Ok(slot) = self.handle.inner.stdin_slot() else {
            return Ok(());
        };
        let Some(mut stdin) = slot.lock().await.take() else {
            return Ok(());
        };
        match stdin.shutdown().await {
            Err(error) if error.kind() != std::io::ErrorKind::BrokenPipe => Err(error.into()),
            _ => Ok(()),
        }
    }
}
