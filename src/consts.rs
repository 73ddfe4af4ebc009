//! Runtime constants
//!
//! # consts
//!
//! This module houses the names and defaults of every environment variable
//! `kpass` reads, along with a few lazily-evaluated process-wide values.

use std::env;

use once_cell::sync::Lazy;

pub static VERSION: Lazy<String> = Lazy::new(|| env!("KPASS_VERSION").to_owned());
pub static HOME: Lazy<String> = Lazy::new(|| env::var("HOME").unwrap_or_else(|_| ".".to_owned()));

pub const KPASS_STORE: &str = "KPASS_STORE";
pub const KPASS_KEY: &str = "KPASS_KEY";
pub const KPASS_KEY_MODE: &str = "KPASS_KEY_MODE";
pub const KPASS_KEY_FILE: &str = "KPASS_KEY_FILE";
pub const KPASS_TOTP_ENTRY: &str = "KPASS_TOTP_ENTRY";
pub const KPASS_TOTP_FORMAT: &str = "KPASS_TOTP_FORMAT";
pub const KPASS_MODTIME: &str = "KPASS_MODTIME";
pub const KPASS_HOOK_DIR: &str = "KPASS_HOOK_DIR";
pub const KPASS_READONLY: &str = "KPASS_READONLY";
pub const KPASS_INTERACTIVE: &str = "KPASS_INTERACTIVE";
pub const KPASS_HASH_LENGTH: &str = "KPASS_HASH_LENGTH";
pub const KPASS_CLIP_TIMEOUT: &str = "KPASS_CLIP_TIMEOUT";
pub const KPASS_X_SELECTION: &str = "KPASS_X_SELECTION";
pub const KPASS_CIPHER: &str = "KPASS_CIPHER";
pub const KPASS_KDF: &str = "KPASS_KDF";
pub const KPASS_KDF_ITERATIONS: &str = "KPASS_KDF_ITERATIONS";
pub const KPASS_KDF_MEMORY: &str = "KPASS_KDF_MEMORY";
pub const KPASS_KDF_PARALLELISM: &str = "KPASS_KDF_PARALLELISM";
pub const KPASS_LOG: &str = "KPASS_LOG";
// set by `clip` for the `unclip` child it spawns
pub const KPASS_UNCLIP_HASH: &str = "KPASS_UNCLIP_HASH";

pub const DEFAULT_STORE_NAME: &str = ".kpass.kdbx";
pub const DEFAULT_TOTP_ENTRY: &str = "totp";
pub const DEFAULT_TOTP_FORMAT: &str =
    "otpauth://totp/kpass:kpass?algorithm=SHA1&digits=6&issuer=kpass&period=30&secret=%s";
pub const DEFAULT_CLIP_TIMEOUT: u64 = 45;
pub const DEFAULT_X_SELECTION: &str = "clipboard";
pub const DEFAULT_ARGON2_ITERATIONS: u64 = 4;
pub const DEFAULT_ARGON2_MEMORY_KIB: u64 = 64 * 1024;
pub const DEFAULT_ARGON2_PARALLELISM: u32 = 2;
pub const DEFAULT_AES_KDF_ROUNDS: u64 = 100_000;

/// Field names the KDBX representation uses for its own purposes.
pub const TITLE_FIELD: &str = "Title";
pub const PASSWORD_FIELD: &str = "Password";
pub const NOTES_FIELD: &str = "Notes";
pub const OTP_FIELD: &str = "otp";
pub const MODTIME_FIELD: &str = "modtime";
pub const RESERVED_FIELDS: &[&str] = &[NOTES_FIELD, PASSWORD_FIELD, TITLE_FIELD];

/// Name given to the single top-level group of a fresh store.
pub const ROOT_GROUP: &str = "root";
