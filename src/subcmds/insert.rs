use anyhow::Result;

use crate::query::ValueMode;
use crate::store::Transaction;
use crate::subcmds::{confirm, read_multiline, read_secret_twice};

pub fn insert(tx: &Transaction, multiline: bool, force: bool, path: String) -> Result<()> {
    if !force && tx.get(&path, ValueMode::Blank)?.is_some() {
        confirm(format!("An entry exists for {}. Overwrite it?", path))?;
    }

    let secret = if multiline {
        read_multiline(&path)?
    } else {
        read_secret_twice(&path)?
    };

    tx.insert(&path, secret.as_str())?;

    Ok(())
}
