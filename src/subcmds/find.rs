use anyhow::Result;

use crate::query::{QueryMode, QueryOptions, ValueMode};
use crate::store::Transaction;

// Following `gopass`s lead: print the matching paths to stdout, one per line.
pub fn find(tx: &Transaction, term: String) -> Result<()> {
    let matches = tx.query(&QueryOptions::new(QueryMode::Find, ValueMode::Blank, term))?;

    for m in matches {
        println!("{}", m.path);
    }

    Ok(())
}
