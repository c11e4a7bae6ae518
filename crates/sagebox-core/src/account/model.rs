//! Account configuration types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unique identifier for an account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Security/encryption mode for the IMAP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Security {
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
    /// No encryption. Only for local bridges and test servers.
    Plain,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Tls => "SSL/TLS",
            Self::StartTls => "STARTTLS",
            Self::Plain => "None (insecure)",
        }
    }

    const fn to_imap(self) -> sagebox_imap::Security {
        match self {
            Self::Tls => sagebox_imap::Security::Implicit,
            Self::StartTls => sagebox_imap::Security::StartTls,
            Self::Plain => sagebox_imap::Security::None,
        }
    }
}

/// Secret used to authenticate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// Password for LOGIN.
    Password {
        /// The password.
        password: String,
    },
    /// `OAuth2` access token for SASL `XOAUTH2`.
    Token {
        /// The bearer token.
        token: String,
    },
}

impl Credential {
    /// Returns true if the secret is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Password { password } => password.is_empty(),
            Self::Token { token } => token.is_empty(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { .. } => f.write_str("Password(<redacted>)"),
            Self::Token { .. } => f.write_str("Token(<redacted>)"),
        }
    }
}

/// One IMAP account to synchronize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Unique identifier.
    pub id: AccountId,
    /// Server hostname.
    pub host: String,
    /// Server port; the security mode's default when absent.
    #[serde(default)]
    pub port: Option<u16>,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
    /// Login name.
    pub username: String,
    /// Authentication secret.
    pub credential: Credential,
    /// Override for [`SyncSettings::batch_size`].
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Override for [`SyncSettings::pool_size`].
    #[serde(default)]
    pub pool_size: Option<usize>,
}

impl AccountConfig {
    /// Creates a password account on implicit TLS with default port.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            id: AccountId::new(id),
            host: host.into(),
            port: None,
            security: Security::default(),
            username: username.into(),
            credential,
            batch_size: None,
            pool_size: None,
        }
    }

    /// Returns the configured port or the default for the security mode.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port
            .unwrap_or_else(|| self.security.to_imap().default_port())
    }

    /// Batch size after applying the per-account override.
    #[must_use]
    pub fn batch_size(&self, settings: &SyncSettings) -> usize {
        self.batch_size.unwrap_or(settings.batch_size).max(1)
    }

    /// Pool size after applying the per-account override.
    #[must_use]
    pub fn pool_size(&self, settings: &SyncSettings) -> usize {
        self.pool_size.unwrap_or(settings.pool_size).max(1)
    }

    /// Builds the connection configuration for the IMAP layer.
    #[must_use]
    pub fn imap_config(&self, settings: &SyncSettings) -> sagebox_imap::Config {
        let credentials = match &self.credential {
            Credential::Password { password } => {
                sagebox_imap::Credentials::password(&self.username, password)
            }
            Credential::Token { token } => sagebox_imap::Credentials::oauth2(&self.username, token),
        };

        sagebox_imap::Config::builder(&self.host)
            .port(self.effective_port())
            .security(self.security.to_imap())
            .credentials(credentials)
            .connect_timeout(settings.connect_timeout)
            .io_timeout(settings.io_timeout)
            .build()
    }
}

/// Engine-wide tuning knobs.
///
/// Passed explicitly to the service; there is no process-wide settings
/// object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Messages per UID FETCH batch.
    pub batch_size: usize,
    /// Concurrent sessions per account.
    pub pool_size: usize,
    /// Number of highest known UIDs whose flags are re-checked each cycle.
    pub flag_window: usize,
    /// Pooled sessions idle longer than this are closed.
    pub idle_timeout: Duration,
    /// Connection attempts before giving up.
    pub max_connect_attempts: u32,
    /// Delay before the second attempt.
    pub backoff_base: Duration,
    /// Upper bound for the retry delay.
    pub backoff_max: Duration,
    /// How often the flag pass covers every known UID instead of the window.
    pub full_reconcile_interval: Duration,
    /// Fetch complete message bodies during sync.
    pub prefetch_bodies: bool,
    /// Bound on TCP connect, TLS handshake and login.
    pub connect_timeout: Duration,
    /// Bound on each IMAP command.
    pub io_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 200,
            pool_size: 4,
            flag_window: 500,
            idle_timeout: Duration::from_secs(300),
            max_connect_attempts: 4,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            full_reconcile_interval: Duration::from_secs(24 * 60 * 60),
            prefetch_bodies: false,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
        }
    }
}
