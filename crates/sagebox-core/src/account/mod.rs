//! Account configuration.
//!
//! Provides account connection settings, engine tuning and validation.

mod model;
mod validation;

pub use model::{AccountConfig, AccountId, Credential, Security, SyncSettings};
pub use validation::{
    MAX_FOLDER_NAME_LEN, ValidationError, ValidationResult, validate_account,
    validate_folder_name,
};
