use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KpassError {
    #[error("Error: Invalid path '{0}'")]
    InvalidPath(String),
    #[error("Error: Invalid match pattern '{0}': '*' is only allowed as the final segment")]
    InvalidMatch(String),
    #[error("Error: Key is empty")]
    EmptyKey,
    #[error("Error: No password or key file available to unlock the store")]
    MissingCredentials,
    #[error("Error: Key command failed: {0}")]
    KeyCommandFailed(String),
    #[error("Error: Cannot ask for a password in non-interactive mode")]
    AskInNonInteractive,
    #[error("Error: Invalid key mode: {0}")]
    InvalidKeyMode(String),
    #[error("Error: Unable to read key file {}", .0.display())]
    KeyFile(PathBuf, #[source] io::Error),
    #[error("Error: Failed to decrypt the store (wrong password or key file?)")]
    DecryptFailed,
    #[error("Error: Store is corrupt: {0}")]
    CorruptDatabase(String),
    #[error("Error: Invalid store layout: {0}")]
    InvalidDatabase(String),
    #[error("Error: Store {} does not exist", .0.display())]
    StoreNotFound(PathBuf),
    #[error("Error: Failed to write the store")]
    WriteFailed(#[source] io::Error),
    #[error("Error: Store is in read-only mode")]
    ReadOnly,
    #[error("Error: {0} is not in the store")]
    EntityNotFound(String),
    #[error("Error: Multiple entries match '{0}'")]
    Ambiguous(String),
    #[error("Error: TOTP secrets must be a single line")]
    TotpMultiLine,
    #[error("Error: '{0}' is a reserved field name")]
    ReservedField(String),
    #[error("Error: Hook directory {} does not exist", .0.display())]
    HookDirMissing(PathBuf),
    #[error("Error: Hook directory must not contain directories: {}", .0.display())]
    HookDirNotFlat(PathBuf),
    #[error("Error: Hook {} failed ({})", .0.display(), .1)]
    HookFailed(PathBuf, String),
    #[error("Error: Empty path")]
    EmptyPath,
    #[error("Error: Secret is empty")]
    EmptySecret,
    #[error("Error: Query requires search criteria")]
    MissingCriteria,
    #[error("Error: Invalid configuration for {0}: {1}")]
    Config(&'static str, String),
    #[error("Error: URI was not in valid Key Uri Format.\n\
             See https://github.com/google/google-authenticator/wiki/Key-Uri-Format for more information.")]
    InvalidKeyUri,
    #[error("Error: User aborted")]
    UserAbort,
    #[error("Error: The entered passwords do not match.")]
    PasswordsDontMatch,
    #[error("Error: No clipboard available (neither WAYLAND_DISPLAY nor DISPLAY is set)")]
    ClipFailed,
    #[error("Error: Failed to read from the clipboard")]
    PasteFailed,
    #[error(transparent)]
    Io(#[from] io::Error),
}
