use anyhow::Result;

use crate::error::KpassError;
use crate::store::Transaction;
use crate::subcmds::confirm;

pub fn rm(tx: &Transaction, force: bool, pattern: String) -> Result<()> {
    let targets = tx.match_path(&pattern)?;
    if targets.is_empty() {
        return Err(KpassError::EntityNotFound(pattern).into());
    }

    if !force {
        for target in &targets {
            println!("{}", target.path);
        }
        confirm(format!(
            "Are you sure you would like to delete {} entr{}?",
            targets.len(),
            if targets.len() == 1 { "y" } else { "ies" }
        ))?;
    }

    tx.remove_all(&targets)?;

    Ok(())
}
