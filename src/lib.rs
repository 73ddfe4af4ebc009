//! `kpass` keeps secrets in a single KeePass (KDBX 4) database and exposes
//! them through slash-separated entry paths.
//!
//! The engine lives in [`store`]: a [`store::Transaction`] resolves the
//! credential, decodes the database through [`kdbx`], applies a query or
//! mutation, and seals the result back to disk with hooks run around every
//! write. [`cli`] is a thin command-line surface over it.

pub mod cli;
pub mod clipboard;
pub mod config;
pub mod consts;
pub mod credential;
pub mod error;
pub mod hooks;
pub mod kdbx;
#[cfg(feature = "otp")]
pub mod otp;
pub mod path;
pub mod query;
pub mod store;
mod subcmds;
pub mod totp;
pub mod tree;

pub use error::KpassError;

pub type Result<T, E = KpassError> = std::result::Result<T, E>;
