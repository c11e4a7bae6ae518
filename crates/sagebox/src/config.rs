//! Configuration file handling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use sagebox_core::{AccountConfig, AccountId, Credential, SyncSettings};
use serde::{Deserialize, Serialize};

/// Contents of `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Accounts to synchronize.
    pub accounts: Vec<AccountConfig>,
    /// Engine tuning.
    #[serde(default)]
    pub settings: SettingsFile,
    /// Where the per-account databases live.
    #[serde(default)]
    pub database_dir: Option<PathBuf>,
}

/// [`SyncSettings`] with durations as plain numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub batch_size: usize,
    pub pool_size: usize,
    pub flag_window: usize,
    pub idle_timeout_secs: u64,
    pub max_connect_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_secs: u64,
    pub full_reconcile_interval_secs: u64,
    pub prefetch_bodies: bool,
    pub connect_timeout_secs: u64,
    pub io_timeout_secs: u64,
}

impl Default for SettingsFile {
    fn default() -> Self {
        let defaults = SyncSettings::default();
        Self {
            batch_size: defaults.batch_size,
            pool_size: defaults.pool_size,
            flag_window: defaults.flag_window,
            idle_timeout_secs: defaults.idle_timeout.as_secs(),
            max_connect_attempts: defaults.max_connect_attempts,
            backoff_base_ms: u64::try_from(defaults.backoff_base.as_millis()).unwrap_or(u64::MAX),
            backoff_max_secs: defaults.backoff_max.as_secs(),
            full_reconcile_interval_secs: defaults.full_reconcile_interval.as_secs(),
            prefetch_bodies: defaults.prefetch_bodies,
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            io_timeout_secs: defaults.io_timeout.as_secs(),
        }
    }
}

impl From<&SettingsFile> for SyncSettings {
    fn from(file: &SettingsFile) -> Self {
        Self {
            batch_size: file.batch_size,
            pool_size: file.pool_size,
            flag_window: file.flag_window,
            idle_timeout: Duration::from_secs(file.idle_timeout_secs),
            max_connect_attempts: file.max_connect_attempts,
            backoff_base: Duration::from_millis(file.backoff_base_ms),
            backoff_max: Duration::from_secs(file.backoff_max_secs),
            full_reconcile_interval: Duration::from_secs(file.full_reconcile_interval_secs),
            prefetch_bodies: file.prefetch_bodies,
            connect_timeout: Duration::from_secs(file.connect_timeout_secs),
            io_timeout: Duration::from_secs(file.io_timeout_secs),
        }
    }
}

impl Config {
    /// `<config dir>/sagebox/config.json`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sagebox")
            .join("config.json")
    }

    /// Reads the file and applies `SAGEBOX_PASSWORD_<ACCOUNT>` overrides.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::parse(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.apply_password_overrides(|key| std::env::var(key).ok());
        tracing::debug!(path = %path.display(), accounts = config.accounts.len(), "config loaded");
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        if config.accounts.is_empty() {
            bail!("no accounts configured");
        }
        Ok(config)
    }

    fn apply_password_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for account in &mut self.accounts {
            if let Some(password) = lookup(&password_env_key(&account.id)) {
                account.credential = Credential::Password { password };
            }
        }
    }

    /// Engine settings for the service.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings::from(&self.settings)
    }

    /// Database file of an account.
    pub fn database_path(&self, id: &AccountId) -> PathBuf {
        self.database_dir
            .clone()
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("sagebox")
            })
            .join(format!("{id}.db"))
    }

    /// The named account, or every account when `name` is `None`.
    pub fn select_accounts(&self, name: Option<&str>) -> Result<Vec<AccountId>> {
        match name {
            None => Ok(self.accounts.iter().map(|a| a.id.clone()).collect()),
            Some(name) => {
                let Some(account) = self.accounts.iter().find(|a| a.id.as_str() == name) else {
                    bail!("no account named {name:?} in config");
                };
                Ok(vec![account.id.clone()])
            }
        }
    }
}

/// `SAGEBOX_PASSWORD_WORK` for account `work`.
fn password_env_key(id: &AccountId) -> String {
    let suffix: String = id
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("SAGEBOX_PASSWORD_{suffix}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "accounts": [{
            "id": "work",
            "host": "imap.example.com",
            "username": "alice@example.com",
            "credential": { "type": "password", "password": "" }
        }]
    }"#;

    #[test]
    fn minimal_config_uses_default_settings() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.sync_settings(), SyncSettings::default());
        assert!(config.database_dir.is_none());
    }

    #[test]
    fn settings_are_converted() {
        let json = r#"{
            "accounts": [],
            "settings": { "batch_size": 50, "backoff_base_ms": 250, "prefetch_bodies": true }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let settings = config.sync_settings();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.backoff_base, Duration::from_millis(250));
        assert!(settings.prefetch_bodies);
        assert_eq!(settings.flag_window, SyncSettings::default().flag_window);
    }

    #[test]
    fn empty_account_list_is_rejected() {
        assert!(Config::parse(r#"{ "accounts": [] }"#).is_err());
    }

    #[test]
    fn environment_password_wins() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.apply_password_overrides(|key| {
            (key == "SAGEBOX_PASSWORD_WORK").then(|| "from-env".to_string())
        });
        assert_eq!(
            config.accounts[0].credential,
            Credential::Password {
                password: "from-env".into()
            }
        );
    }

    #[test]
    fn env_key_is_normalized() {
        assert_eq!(
            password_env_key(&AccountId::new("my-mail.box")),
            "SAGEBOX_PASSWORD_MY_MAIL_BOX"
        );
    }

    #[test]
    fn database_path_per_account() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.database_dir = Some(PathBuf::from("/var/lib/sagebox"));
        assert_eq!(
            config.database_path(&AccountId::new("work")),
            PathBuf::from("/var/lib/sagebox/work.db")
        );
    }

    #[test]
    fn account_selection() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.select_accounts(None).unwrap().len(), 1);
        assert!(config.select_accounts(Some("work")).is_ok());
        assert!(config.select_accounts(Some("home")).is_err());
    }
}
