//! Account validation.

use super::model::AccountConfig;

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Account id is empty.
    EmptyId,
    /// IMAP host is empty.
    EmptyHost,
    /// IMAP port is 0.
    InvalidPort,
    /// Username is empty.
    EmptyUsername,
    /// Password or token is empty.
    EmptyCredential,
    /// Batch size override is 0.
    InvalidBatchSize,
    /// Pool size override is 0.
    InvalidPoolSize,
    /// Folder name is empty or longer than 255 characters.
    FolderNameLength,
    /// Folder name has characters outside `A-Za-z0-9._-`, or starts or
    /// ends with `-` or `_`.
    FolderNameCharacters,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyId => "Account id is required",
            Self::EmptyHost => "IMAP server is required",
            Self::InvalidPort => "IMAP port must be 1-65535",
            Self::EmptyUsername => "IMAP username is required",
            Self::EmptyCredential => "IMAP password or token is required",
            Self::InvalidBatchSize => "Batch size must be at least 1",
            Self::InvalidPoolSize => "Pool size must be at least 1",
            Self::FolderNameLength => "Folder name must be between 1 and 255 characters long",
            Self::FolderNameCharacters => {
                "Folder name may only contain letters, digits, '.', '_' and '-', \
                 and must not start or end with '-' or '_'"
            }
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyId => "id",
            Self::EmptyHost => "host",
            Self::InvalidPort => "port",
            Self::EmptyUsername => "username",
            Self::EmptyCredential => "credential",
            Self::InvalidBatchSize => "batch_size",
            Self::InvalidPoolSize => "pool_size",
            Self::FolderNameLength | Self::FolderNameCharacters => "name",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an account configuration.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_account(account: &AccountConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if account.id.as_str().trim().is_empty() {
        errors.push(ValidationError::EmptyId);
    }
    if account.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if account.port == Some(0) {
        errors.push(ValidationError::InvalidPort);
    }
    if account.username.trim().is_empty() {
        errors.push(ValidationError::EmptyUsername);
    }
    if account.credential.is_empty() {
        errors.push(ValidationError::EmptyCredential);
    }
    if account.batch_size == Some(0) {
        errors.push(ValidationError::InvalidBatchSize);
    }
    if account.pool_size == Some(0) {
        errors.push(ValidationError::InvalidPoolSize);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Maximum folder name length, in characters.
pub const MAX_FOLDER_NAME_LEN: usize = 255;

/// Validate a name for a mailbox created or renamed by the user.
///
/// # Errors
///
/// Returns the first rule the name breaks.
pub fn validate_folder_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if len == 0 || len > MAX_FOLDER_NAME_LEN {
        return Err(ValidationError::FolderNameLength);
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    let edge = |c: char| matches!(c, '-' | '_');
    if !name.chars().all(allowed) || name.starts_with(edge) || name.ends_with(edge) {
        return Err(ValidationError::FolderNameCharacters);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::Credential;

    fn valid() -> AccountConfig {
        AccountConfig::new(
            "work",
            "imap.example.com",
            "alice",
            Credential::Password {
                password: "secret".into(),
            },
        )
    }

    #[test]
    fn valid_account_passes() {
        assert!(validate_account(&valid()).is_ok());
    }

    #[test]
    fn reports_every_problem_at_once() {
        let mut account = valid();
        account.host = "  ".into();
        account.port = Some(0);
        account.username = String::new();
        account.credential = Credential::Token {
            token: String::new(),
        };

        let errors = validate_account(&account).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyHost,
                ValidationError::InvalidPort,
                ValidationError::EmptyUsername,
                ValidationError::EmptyCredential,
            ]
        );
    }

    #[test]
    fn zero_overrides_are_rejected() {
        let mut account = valid();
        account.batch_size = Some(0);
        account.pool_size = Some(0);

        let errors = validate_account(&account).unwrap_err();
        let fields: Vec<_> = errors.iter().map(ValidationError::field).collect();
        assert_eq!(fields, ["batch_size", "pool_size"]);
    }

    #[test]
    fn folder_names() {
        for good in ["Projects", "2024.receipts", "a", "work-items", "x_y"] {
            assert_eq!(validate_folder_name(good), Ok(()), "{good}");
        }
        assert_eq!(validate_folder_name(""), Err(ValidationError::FolderNameLength));
        assert_eq!(
            validate_folder_name(&"a".repeat(256)),
            Err(ValidationError::FolderNameLength)
        );
        assert!(validate_folder_name(&"a".repeat(255)).is_ok());
        for bad in ["my folder", "-lead", "trail_", "Work/Sub", "caf\u{e9}"] {
            assert_eq!(
                validate_folder_name(bad),
                Err(ValidationError::FolderNameCharacters),
                "{bad}"
            );
        }
    }

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(
            ValidationError::EmptyCredential.to_string(),
            "IMAP password or token is required"
        );
    }
}
