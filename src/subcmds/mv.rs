use anyhow::Result;

use crate::error::KpassError;
use crate::path::{self, Pattern};
use crate::query::ValueMode;
use crate::store::{Entity, Transaction};
use crate::subcmds::confirm;

pub(crate) fn mv(tx: &Transaction, force: bool, source: String, dest: String) -> Result<()> {
    let moves = match Pattern::parse(&source)? {
        Pattern::Directory(_) => {
            if !path::is_directory(&dest) {
                return Err(KpassError::InvalidPath(dest).into());
            }

            let entities = tx.match_values(&source, ValueMode::Secret)?;
            if entities.is_empty() {
                return Err(KpassError::EntityNotFound(source).into());
            }

            entities
                .into_iter()
                .map(|e| {
                    let dst = path::canonicalize(format!("{}{}", dest, e.title()));
                    (e, dst)
                })
                .collect::<Vec<_>>()
        }
        Pattern::Exact(exact) => {
            let entity = tx
                .get(&exact, ValueMode::Secret)?
                .ok_or_else(|| KpassError::EntityNotFound(exact.clone()))?;
            let dst = if path::is_directory(&dest) {
                path::canonicalize(format!("{}{}", dest, entity.title()))
            } else {
                path::canonicalize(&dest)
            };

            vec![(entity, dst)]
        }
    };

    if !force {
        check_overwrites(tx, &moves)?;
    }

    for (entity, dst) in &moves {
        tx.move_entry(entity, dst)?;
        println!("Moved {} to {}", entity.path, dst);
    }

    Ok(())
}

fn check_overwrites(tx: &Transaction, moves: &[(Entity, String)]) -> Result<()> {
    for (entity, dst) in moves {
        if entity.path != *dst && tx.get(dst, ValueMode::Blank)?.is_some() {
            confirm(format!("An entry exists for {}. Overwrite it?", dst))?;
        }
    }

    Ok(())
}
