use anyhow::Result;
use zeroize::Zeroizing;

use crate::clipboard;
use crate::error::KpassError;
use crate::otp::TOTP;
use crate::path;
use crate::query::{QueryMode, QueryOptions, ValueMode};
use crate::store::Transaction;
use crate::totp;

/// `path` may name the TOTP entry itself or the directory holding it.
fn seed_url(tx: &Transaction, path: &str) -> Result<Zeroizing<String>> {
    let totp_entry = &tx.config().totp_entry;
    let path = if totp::is_totp_title(path::base(path), totp_entry) {
        path::canonicalize(path)
    } else {
        path::canonicalize(format!("{}/{}", path, totp_entry))
    };

    let entity = tx
        .get(&path, ValueMode::Secret)?
        .ok_or_else(|| KpassError::EntityNotFound(path.clone()))?;
    let url = totp::format_url(&tx.config().totp_format, entity.secret.as_str())?;

    Ok(Zeroizing::new(url))
}

pub fn ls(tx: &Transaction) -> Result<()> {
    let options = QueryOptions::new(
        QueryMode::Suffix,
        ValueMode::Blank,
        tx.config().totp_entry.as_str(),
    );

    for entity in tx.query(&options)?.iter().filter(|e| e.is_totp) {
        println!("{}", entity.path);
    }

    Ok(())
}

pub fn show(tx: &Transaction, path: String, clip: bool) -> Result<()> {
    let url = seed_url(tx, &path)?;
    let totp = TOTP::from_uri(url.as_str())?;
    let code = Zeroizing::new(totp.generate());

    if clip {
        clipboard::clip_and_clear(code.as_str(), tx.config())?;
        println!("Copied code to the clipboard, valid for {}s.", totp.remaining());
    } else {
        println!("{}", *code);
    }

    Ok(())
}

pub fn uri(tx: &Transaction, path: String) -> Result<()> {
    let url = seed_url(tx, &path)?;
    println!("{}", *url);

    Ok(())
}
