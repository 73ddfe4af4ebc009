use anyhow::Result;

use crate::clipboard;
use crate::error::KpassError;
use crate::query::ValueMode;
use crate::store::{Entity, Transaction};

fn lookup(tx: &Transaction, path: &str) -> Result<Entity> {
    let entity = tx
        .get(path, ValueMode::Secret)?
        .ok_or_else(|| KpassError::EntityNotFound(path.to_owned()))?;

    Ok(entity)
}

pub fn show(tx: &Transaction, path: String) -> Result<()> {
    let entity = lookup(tx, &path)?;
    println!("{}", entity.secret.trim_end());

    Ok(())
}

pub fn clip(tx: &Transaction, path: String) -> Result<()> {
    let entity = lookup(tx, &path)?;
    clipboard::clip_and_clear(entity.secret.trim_end(), tx.config())?;

    println!(
        "Copied {} to the clipboard. Will clear in {} seconds.",
        entity.path,
        tx.config().clip_timeout
    );

    Ok(())
}
