use anyhow::Result;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::query::{QueryMode, QueryOptions, ValueMode};
use crate::store::Transaction;

#[derive(Debug, Serialize)]
struct JsonEntry<'a> {
    path: &'a str,
    modtime: &'a str,
    value: &'a str,
}

pub fn json(tx: &Transaction, values: ValueMode, term: Option<String>) -> Result<()> {
    let options = match term {
        Some(term) => QueryOptions::new(QueryMode::Find, values, term),
        None => QueryOptions::list(values),
    };
    let entities = tx.query(&options)?;

    let entries = entities
        .iter()
        .map(|e| JsonEntry {
            path: &e.path,
            modtime: &e.modtime,
            value: &e.secret,
        })
        .collect::<Vec<_>>();

    let out = Zeroizing::new(serde_json::to_string_pretty(&entries)?);
    println!("{}", *out);

    Ok(())
}
