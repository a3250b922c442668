use std::sync::Arc;
use tokio::sync::watch;

use crate::error::ConfigError;

use super::Config;

/// Process-wide configuration record that notifies subscribers on change.
///
/// Readers take a cheap `Arc<Config>` snapshot with [`current`](Self::current);
/// a spawned process keeps the snapshot it was started with, so later updates
/// only affect handles spawned afterwards.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    tx: Arc<watch::Sender<Arc<Config>>>,
}

impl SharedConfig {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(config));
        Self { tx: Arc::new(tx) }
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn current(&self) -> Arc<Config> {
        self.tx.borrow().clone()
    }

    /// Apply `change` to a copy of the current config and publish it.
    ///
    /// The copy is validated first; on error the current value is kept and
    /// subscribers are not notified.
    pub fn update<F>(&self, change: F) -> Result<Arc<Config>, ConfigError>
    where
        F: FnOnce(&mut Config),
    {
        let mut next = Config::clone(&self.current());
        change(&mut next);
        next.validate()?;
        let next = Arc::new(next);
        self.tx.send_replace(next.clone());
        Ok(next)
    }

    /// Replace the configuration wholesale.
    pub fn replace(&self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;
        self.tx.send_replace(Arc::new(config));
        Ok(())
    }

    /// Receiver that observes every subsequent change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.tx.subscribe()
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}
