//! Pipeline composition across sinks, processes, and transforms

#![cfg(unix)]

use dzx::{Config, RunError, Shell, Sink, Transform};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn quiet_shell() -> Shell {
    Shell::new(
        Config::builder()
            .verbose(0)
            .build()
            .expect("default config is valid"),
    )
}

// ============================================================================
// Tee sinks
// ============================================================================

#[tokio::test]
async fn test_sink_receives_stdout_only_in_order() -> Result<()> {
    let (writer, mut reader) = tokio::io::duplex(64);
    let handle = quiet_shell().spawn("echo -n 1; echo -n 2 >&2; echo -n 3");

    handle.pipe(Sink::new(writer))?.await?;

    let mut content = String::new();
    reader.read_to_string(&mut content).await?;
    assert_eq!(content, "13");
    Ok(())
}

#[tokio::test]
async fn test_small_sink_applies_backpressure_without_losing_data() -> Result<()> {
    let (writer, mut reader) = tokio::io::duplex(16);
    let handle = quiet_shell().spawn("seq 1 2000");
    let pipeline = handle.pipe(Sink::new(writer))?;

    let reading = tokio::spawn(async move {
        let mut content = String::new();
        reader.read_to_string(&mut content).await.map(|_| content)
    });
    pipeline.await?;

    let content = reading.await??;
    assert_eq!(content.lines().count(), 2000);
    assert_eq!(content.lines().last(), Some("2000"));
    Ok(())
}

// ============================================================================
// Process handoff
// ============================================================================

#[tokio::test]
async fn test_three_stage_pipeline() -> Result<()> {
    let shell = quiet_shell();
    let output = shell
        .spawn("printf 'pear\\napple\\npear\\nfig\\n'")
        .pipe("sort")?
        .pipe(shell.spawn("uniq -c"))?
        .pipe("awk '{print $2\"=\"$1}'")?
        .await?;

    assert_eq!(output.stdout, "apple=1\nfig=1\npear=2\n");
    Ok(())
}

#[tokio::test]
async fn test_stderr_can_be_piped() -> Result<()> {
    let output = quiet_shell()
        .spawn("echo visible; echo hidden >&2")
        .stderr()
        .pipe("tr a-z A-Z")?
        .await?;
    assert_eq!(output.stdout, "HIDDEN\n");
    Ok(())
}

#[tokio::test]
async fn test_destination_stdin_can_be_written_by_hand() -> Result<()> {
    let handle = quiet_shell().spawn("cat");
    let stdin = handle.stdin()?;
    stdin.write("typed\n").await?;
    stdin.close().await?;

    assert_eq!(handle.await?.stdout, "typed\n");
    Ok(())
}

#[tokio::test]
async fn test_early_exiting_consumer_finishes_pipeline() -> Result<()> {
    let pipeline = quiet_shell().spawn("seq 1 1000000").pipe("head -n 3")?;
    let output = tokio::time::timeout(Duration::from_secs(10), pipeline.output()).await??;
    assert_eq!(output.stdout, "1\n2\n3\n");
    Ok(())
}

#[tokio::test]
async fn test_upstream_failure_fails_the_chain() {
    let err = quiet_shell()
        .spawn("echo data; exit 9")
        .pipe("cat")
        .expect("pipe connects")
        .await
        .unwrap_err();

    let error = err.process_error().expect("process error");
    assert_eq!(error.status().code, 9);
    assert_eq!(error.output().stdout, "data\n");
}

#[tokio::test]
async fn test_consumed_channel_cannot_be_piped() -> Result<()> {
    let handle = quiet_shell().spawn("echo once");
    assert_eq!(handle.stdout().read().await?, "once");

    let err = handle.pipe("cat").unwrap_err();
    assert!(matches!(err, RunError::AlreadyConsumed { .. }));
    Ok(())
}

// ============================================================================
// Transforms
// ============================================================================

#[tokio::test]
async fn test_transform_view_reads_transformed_output() -> Result<()> {
    let (ours, mut theirs) = tokio::io::duplex(256);
    tokio::spawn(async move {
        let mut input = Vec::new();
        if theirs.read_to_end(&mut input).await.is_ok() {
            input.reverse();
            let _ = theirs.write_all(&input).await;
        }
    });

    let view = quiet_shell().spawn("printf abc").pipe_through(Transform::new(ours))?;
    assert_eq!(view.await?, "cba");
    Ok(())
}
