use anyhow::Result;
use termion::is_tty;

use crate::query::{QueryOptions, ValueMode};
use crate::store::Transaction;
use crate::tree::Tree;

pub fn ls(tx: &Transaction, tree: bool) -> Result<()> {
    let entities = tx.query(&QueryOptions::list(ValueMode::Blank))?;

    if !tree {
        for entity in &entities {
            println!("{}", entity.path);
        }

        return Ok(());
    }

    let name = tx
        .config()
        .store
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "kpass".to_owned());
    let tree = Tree::from_paths(&name, entities.iter().map(|e| e.path.as_str()))
        .with_color(is_tty(&std::io::stdout()));

    print!("{}", tree);

    Ok(())
}
