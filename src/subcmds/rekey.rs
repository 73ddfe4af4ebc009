use std::path::PathBuf;

use anyhow::Result;
use log::debug;

use crate::credential::{Credential, KeyMode};
use crate::error::KpassError;
use crate::store::Transaction;
use crate::subcmds::read_secret_twice;

pub fn rekey(
    tx: &Transaction,
    key_mode: Option<KeyMode>,
    key: Option<String>,
    key_file: Option<PathBuf>,
    no_key_file: bool,
) -> Result<()> {
    let config = tx.config();
    let key_file = if no_key_file {
        None
    } else {
        key_file.or_else(|| config.key_file.clone())
    };

    let mode = key_mode.unwrap_or(KeyMode::Ask);
    debug!("rekeying with {} key mode", mode);

    // ask for the new password twice instead of once
    let credential = if mode == KeyMode::Ask {
        if !config.interactive {
            return Err(KpassError::AskInNonInteractive.into());
        }
        let secret = read_secret_twice("the store")?;

        Credential::from_parts(secret.as_str(), Some(KeyMode::Plaintext), mode, true)?
    } else {
        Credential::from_parts(key.unwrap_or_default(), Some(mode), mode, config.interactive)?
    };

    tx.rekey(&credential, key_file.as_deref())?;
    println!("Rekeyed {}", config.store.display());

    Ok(())
}
