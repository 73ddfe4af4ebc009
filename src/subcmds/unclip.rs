use std::env;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::debug;

use crate::clipboard;
use crate::config::Config;
use crate::consts::KPASS_UNCLIP_HASH;

pub fn unclip(config: &Config, timeout: u64, force: bool) -> Result<()> {
    let expected = env::var(KPASS_UNCLIP_HASH).unwrap_or_default();
    if expected.is_empty() && !force {
        eprintln!(
            "Unclip is spawned in the background when you copy to your clipboard. \
             This should not be called by a user."
        );
        return Ok(());
    }

    thread::sleep(Duration::from_secs(timeout));

    let current = clipboard::paste(config)?;
    if force || clipboard::hash(&current) == expected {
        clipboard::clear(config)?;
    } else {
        debug!("clipboard changed since it was copied to; leaving it alone");
    }

    Ok(())
}
