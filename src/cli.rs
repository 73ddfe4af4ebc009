use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::debug;

use crate::config::Config;
use crate::consts::VERSION;
use crate::credential::KeyMode;
use crate::query::ValueMode;
use crate::store::Transaction;
use crate::subcmds::*;

#[derive(Debug, Parser)]
#[command(
    name = "kpass",
    version = VERSION.as_str(),
    about = "A password manager built around a single KeePass database",
    max_term_width = 80
)]
struct Kpass {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every entry in the store
    Ls {
        #[arg(long, short = 't')]
        /// Draw the entries as a tree
        tree: bool,
    },
    /// List entries whose path contains term
    Find { term: String },
    /// Print the secret stored at path
    Show { path: String },
    /// Copy the secret stored at path to the clipboard, clearing it after
    /// KPASS_CLIP_TIMEOUT seconds
    Clip { path: String },
    /// Insert a new secret
    Insert {
        #[arg(long, short = 'm')]
        /// Read a multi-line secret until EOF
        multiline: bool,
        #[arg(long, short = 'f')]
        /// Overwrite an existing entry without asking
        force: bool,
        path: String,
    },
    /// Move an entry, or every entry of `dir/*` into a directory ending in `/`
    Mv {
        #[arg(long, short = 'f')]
        /// Replace existing entries without asking
        force: bool,
        source: String,
        dest: String,
    },
    /// Remove an entry, or every entry matched by `dir/*`
    Rm {
        #[arg(long, short = 'f')]
        /// Remove without asking
        force: bool,
        path: String,
    },
    /// Re-encrypt the store under new credentials
    Rekey {
        #[arg(long)]
        /// How the new key is obtained: plaintext, command, ask, none or ignore
        key_mode: Option<KeyMode>,
        #[arg(long)]
        /// New password, or the command printing it
        key: Option<String>,
        #[arg(long, conflicts_with = "no_key_file")]
        /// New key file
        key_file: Option<PathBuf>,
        #[arg(long)]
        /// Stop using a key file
        no_key_file: bool,
    },
    /// Dump entries as JSON
    Json {
        #[arg(long, default_value = "blank")]
        /// blank, hashed or secret
        values: ValueMode,
        /// Only dump entries whose path contains term
        term: Option<String>,
    },
    #[cfg(feature = "otp")]
    /// Work with TOTP entries
    #[command(subcommand)]
    Totp(Totp),
    #[command(hide = true)]
    Unclip {
        timeout: u64,
        #[arg(long, short = 'f')]
        force: bool,
    },
}

#[cfg(feature = "otp")]
#[derive(Debug, Subcommand)]
enum Totp {
    /// List TOTP entries
    Ls,
    /// Print the current code for path
    Show { path: String },
    /// Copy the current code for path to the clipboard
    Clip { path: String },
    /// Print the otpauth URI stored at path
    Uri { path: String },
}

pub fn run() -> Result<()> {
    let kpass = Kpass::parse();
    debug!("{:?}", kpass.command);

    let config = Config::from_env()?;
    if let Command::Unclip { timeout, force } = kpass.command {
        return unclip::unclip(&config, timeout, force);
    }

    let tx = Transaction::new(config)?;

    match kpass.command {
        Command::Ls { tree } => ls::ls(&tx, tree),
        Command::Find { term } => find::find(&tx, term),
        Command::Show { path } => show::show(&tx, path),
        Command::Clip { path } => show::clip(&tx, path),
        Command::Insert {
            multiline,
            force,
            path,
        } => insert::insert(&tx, multiline, force, path),
        Command::Mv {
            force,
            source,
            dest,
        } => mv::mv(&tx, force, source, dest),
        Command::Rm { force, path } => rm::rm(&tx, force, path),
        Command::Rekey {
            key_mode,
            key,
            key_file,
            no_key_file,
        } => rekey::rekey(&tx, key_mode, key, key_file, no_key_file),
        Command::Json { values, term } => json::json(&tx, values, term),
        #[cfg(feature = "otp")]
        Command::Totp(cmd) => match cmd {
            Totp::Ls => totp::ls(&tx),
            Totp::Show { path } => totp::show(&tx, path, false),
            Totp::Clip { path } => totp::show(&tx, path, true),
            Totp::Uri { path } => totp::uri(&tx, path),
        },
        Command::Unclip { .. } => Ok(()),
    }
}
