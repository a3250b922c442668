//! Configuration discovery feeding real process runs
//!
//! Discovery is driven through `Config::discover_from` with an explicit
//! environment map, so these tests never touch process-global state.

#![cfg(unix)]

use dzx::{Config, ConfigSource, SharedConfig, Shell, StdioMode};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn repo_with_config(contents: &str) -> Result<TempDir> {
    let temp = TempDir::new()?;
    std::fs::create_dir(temp.path().join(".git"))?;
    std::fs::create_dir(temp.path().join(".dzx"))?;
    std::fs::write(temp.path().join(".dzx").join("config.toml"), contents)?;
    Ok(temp)
}

fn discover(dir: &Path, env: &[(&str, &str)]) -> Result<Config> {
    let env: HashMap<String, String> = env
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();
    Ok(Config::discover_from(dir, &env)?)
}

#[tokio::test]
async fn test_file_prefix_applies_to_spawned_commands() -> Result<()> {
    let repo = repo_with_config("[shell]\nprefix = \"set -e; export ORIGIN=file;\"\nverbose = 0\n")?;
    let nested = repo.path().join("a").join("b");
    std::fs::create_dir_all(&nested)?;

    let config = discover(&nested, &[])?;
    assert!(matches!(config.source_of("prefix"), ConfigSource::ConfigFile(_)));

    let output = Shell::new(config).spawn("echo $ORIGIN").await?;
    assert_eq!(output.stdout, "file\n");
    Ok(())
}

#[tokio::test]
async fn test_environment_beats_file() -> Result<()> {
    let repo = repo_with_config("[shell]\nverbose = 0\nstderr = \"piped\"\n")?;
    let config = discover(repo.path(), &[("DZX_STDERR", "null")])?;

    assert_eq!(config.stderr, StdioMode::Null);
    assert_eq!(config.source_of("stderr"), &ConfigSource::Environment);

    let output = Shell::new(config).spawn("echo hidden >&2; echo shown").await?;
    assert_eq!(output.stderr, "");
    assert_eq!(output.stdout, "shown\n");
    Ok(())
}

#[tokio::test]
async fn test_shared_update_applies_to_later_spawns_only() -> Result<()> {
    let repo = repo_with_config("[shell]\nverbose = 0\n")?;
    let shared = SharedConfig::new(discover(repo.path(), &[])?);
    let shell = Shell::with_shared(shared.clone());

    let early = shell.spawn("echo ${PHASE:-unset}");
    early.start()?;
    shared.update(|config| config.prefix = "PHASE=late;".to_string())?;
    let late = shell.spawn("echo ${PHASE:-unset}");

    assert_eq!(early.await?.stdout, "unset\n");
    assert_eq!(late.await?.stdout, "late\n");
    Ok(())
}

#[test]
fn test_unknown_keys_are_rejected() -> Result<()> {
    let repo = repo_with_config("[shell]\ncolour = \"always\"\n")?;
    let err = discover(repo.path(), &[]).unwrap_err();
    assert!(err.to_string().contains("config.toml"));
    Ok(())
}
