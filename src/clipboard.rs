//! Clipboard access through `wl-copy`/`wl-paste` on Wayland, `xclip` on X11
//! and `pbcopy`/`pbpaste` on macOS.

use std::env;
use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use data_encoding::HEXLOWER;
use log::debug;
use ring::digest;

use crate::config::Config;
use crate::consts::KPASS_UNCLIP_HASH;
use crate::error::KpassError;

enum Backend {
    Wayland,
    X11,
    Mac,
}

fn backend() -> Option<Backend> {
    if env::var_os("WAYLAND_DISPLAY").is_some() {
        Some(Backend::Wayland)
    } else if env::var_os("DISPLAY").is_some() {
        Some(Backend::X11)
    } else if cfg!(target_os = "macos") {
        Some(Backend::Mac)
    } else {
        None
    }
}

pub fn clip<S>(contents: S, config: &Config) -> Result<()>
where
    S: AsRef<[u8]>,
{
    let mut command = match backend().ok_or(KpassError::ClipFailed)? {
        Backend::Wayland => {
            let mut c = Command::new("wl-copy");
            c.arg("--trim-newline");
            c
        }
        Backend::X11 => {
            let mut c = Command::new("xclip");
            c.args(["-in", "-selection", &config.x_selection]);
            c
        }
        Backend::Mac => Command::new("pbcopy"),
    };

    let mut child = command
        .stdin(Stdio::piped())
        .spawn()
        .with_context(|| "Failed to spawn clipboard command")?;
    child
        .stdin
        .take()
        .with_context(|| "stdin wasn't captured")?
        .write_all(contents.as_ref())?;
    child.wait()?;

    Ok(())
}

pub fn paste(config: &Config) -> Result<Vec<u8>> {
    let mut command = match backend().ok_or(KpassError::PasteFailed)? {
        Backend::Wayland => {
            let mut c = Command::new("wl-paste");
            c.arg("--no-newline");
            c
        }
        Backend::X11 => {
            let mut c = Command::new("xclip");
            c.args(["-out", "-selection", &config.x_selection]);
            c
        }
        Backend::Mac => Command::new("pbpaste"),
    };

    let output = command
        .output()
        .with_context(|| "Failed to spawn clipboard command")?;
    if !output.status.success() {
        return Err(KpassError::PasteFailed.into());
    }

    Ok(output.stdout)
}

pub fn clear(config: &Config) -> Result<()> {
    match backend().ok_or(KpassError::ClipFailed)? {
        Backend::Wayland => {
            Command::new("wl-copy").arg("--clear").status()?;
        }
        _ => clip(b"", config)?,
    }

    Ok(())
}

pub fn hash<S>(contents: S) -> String
where
    S: AsRef<[u8]>,
{
    HEXLOWER.encode(digest::digest(&digest::SHA256, contents.as_ref()).as_ref())
}

/// Copies `contents` and leaves an `unclip` child behind that clears the
/// clipboard after the configured timeout, unless it changed in between.
pub fn clip_and_clear<S>(contents: S, config: &Config) -> Result<()>
where
    S: AsRef<[u8]>,
{
    let contents = contents.as_ref();
    clip(contents, config)?;

    debug!("clearing clipboard in {} seconds", config.clip_timeout);
    Command::new(env::current_exe()?)
        .args(["unclip", &config.clip_timeout.to_string()])
        .env(KPASS_UNCLIP_HASH, hash(contents))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| "Failed to spawn unclip")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
