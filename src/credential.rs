//! Credential resolution
//!
//! # credential
//!
//! A store is unlocked by a password, a key file, or both. The password is
//! obtained according to a [`KeyMode`]; the resulting material is folded
//! into a KDBX [`CompositeKey`] right before the codec needs it and dropped
//! (zeroed) afterwards.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use data_encoding::{BASE64, HEXLOWER_PERMISSIVE, HEXUPPER};
use log::debug;
use termion::input::TermRead;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::error::KpassError;
use crate::kdbx::crypto;
use crate::kdbx::xml;
use crate::Result;

pub const PROMPT: &str = "password:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// The key is the configured value itself.
    Plaintext,
    /// The key is the trimmed stdout of running the configured command.
    Command,
    /// The key is read from the terminal.
    Ask,
    /// No password; the store is unlocked by its key file alone.
    None,
    /// Whatever is configured is discarded; behaves like `None`.
    Ignore,
}

impl FromStr for KeyMode {
    type Err = KpassError;

    fn from_str(s: &str) -> Result<KeyMode> {
        match s.trim().to_lowercase().as_ref() {
            "plaintext" => Ok(KeyMode::Plaintext),
            "command" => Ok(KeyMode::Command),
            "ask" => Ok(KeyMode::Ask),
            "none" => Ok(KeyMode::None),
            "ignore" => Ok(KeyMode::Ignore),
            other => Err(KpassError::InvalidKeyMode(format!("unknown mode '{}'", other))),
        }
    }
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyMode::Plaintext => "plaintext",
            KeyMode::Command => "command",
            KeyMode::Ask => "ask",
            KeyMode::None => "none",
            KeyMode::Ignore => "ignore",
        };

        f.write_str(name)
    }
}

/// A validated password source.
pub struct Credential {
    mode: KeyMode,
    key: Zeroizing<String>,
    interactive: bool,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("mode", &self.mode)
            .field("interactive", &self.interactive)
            .finish()
    }
}

impl Credential {
    /// Builds the credential described by `config`, using `default_mode` when
    /// the configuration does not name one.
    pub fn new(config: &Config, default_mode: KeyMode) -> Result<Credential> {
        Credential::from_parts(
            config.key.as_str(),
            config.key_mode,
            default_mode,
            config.interactive,
        )
    }

    pub fn from_parts<S>(
        key: S,
        mode: Option<KeyMode>,
        default_mode: KeyMode,
        interactive: bool,
    ) -> Result<Credential>
    where
        S: AsRef<str>,
    {
        let mode = mode.unwrap_or(default_mode);
        let key = key.as_ref();
        let empty = key.trim().is_empty();

        let key = match mode {
            KeyMode::None | KeyMode::Ask if !empty => {
                return Err(KpassError::InvalidKeyMode(format!(
                    "a key must not be set in {} mode",
                    mode
                )));
            }
            KeyMode::Plaintext | KeyMode::Command if empty => return Err(KpassError::EmptyKey),
            KeyMode::Ignore => String::new(),
            _ => key.to_owned(),
        };
        debug!("using {} key mode", mode);

        Ok(Credential {
            mode,
            key: Zeroizing::new(key),
            interactive,
        })
    }

    /// Materializes the password. `None` means the store is unlocked without
    /// one. `prompt` is only called in [`KeyMode::Ask`].
    pub fn read<F>(&self, prompt: F) -> Result<Option<Zeroizing<String>>>
    where
        F: FnOnce(&str) -> io::Result<Zeroizing<String>>,
    {
        let password = match self.mode {
            KeyMode::None | KeyMode::Ignore => return Ok(None),
            KeyMode::Plaintext => Zeroizing::new(self.key.as_str().to_owned()),
            KeyMode::Command => run_key_command(&self.key)?,
            KeyMode::Ask => {
                if !self.interactive {
                    return Err(KpassError::AskInNonInteractive);
                }

                prompt(PROMPT)?
            }
        };

        if password.trim().is_empty() {
            return Err(KpassError::EmptyKey);
        }

        Ok(Some(password))
    }

    /// Reads the password and combines it with `key_file`.
    pub fn composite_key<F>(&self, key_file: Option<&Path>, prompt: F) -> Result<CompositeKey>
    where
        F: FnOnce(&str) -> io::Result<Zeroizing<String>>,
    {
        let password = self.read(prompt)?;

        CompositeKey::new(password.as_ref().map(|p| p.as_bytes()), key_file)
    }
}

fn run_key_command(command: &str) -> Result<Zeroizing<String>> {
    let mut argv = command.split_whitespace();
    let bin = argv.next().ok_or(KpassError::EmptyKey)?;

    debug!("running key command {}", bin);
    let output = Command::new(bin)
        .args(argv)
        .stdin(Stdio::inherit())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| KpassError::KeyCommandFailed(format!("{}: {}", bin, e)))?;
    let stdout = Zeroizing::new(output.stdout);

    if !output.status.success() {
        return Err(KpassError::KeyCommandFailed(format!(
            "{} exited with {}",
            bin, output.status
        )));
    }

    let stdout = std::str::from_utf8(&stdout)
        .map_err(|_| KpassError::KeyCommandFailed(format!("{} printed invalid UTF-8", bin)))?;

    Ok(Zeroizing::new(stdout.trim().to_owned()))
}

/// Reads a password from the terminal without echoing it.
pub fn terminal_prompt(prompt: &str) -> io::Result<Zeroizing<String>> {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    write!(stdout, "{} ", prompt)?;
    stdout.flush()?;
    let password = stdin.read_passwd(&mut stdout)?;
    writeln!(stdout)?;

    Ok(Zeroizing::new(password.unwrap_or_default()))
}

/// The hashed key material KDBX derives its encryption keys from.
pub struct CompositeKey {
    raw: Zeroizing<[u8; 32]>,
}

impl CompositeKey {
    /// Combines an optional password and an optional key file. At least one
    /// of them must be present; an empty password counts as absent.
    pub fn new(password: Option<&[u8]>, key_file: Option<&Path>) -> Result<CompositeKey> {
        let password = password.filter(|p| !p.is_empty());
        let mut parts: Vec<Zeroizing<[u8; 32]>> = Vec::with_capacity(2);

        if let Some(password) = password {
            parts.push(Zeroizing::new(crypto::sha256(&[password])));
        }
        if let Some(path) = key_file {
            parts.push(read_key_file(path)?);
        }
        if parts.is_empty() {
            return Err(KpassError::MissingCredentials);
        }

        let slices = parts.iter().map(|p| &p[..]).collect::<Vec<_>>();

        Ok(CompositeKey {
            raw: Zeroizing::new(crypto::sha256(&slices)),
        })
    }

    pub fn from_password<S>(password: S) -> Result<CompositeKey>
    where
        S: AsRef<str>,
    {
        CompositeKey::new(Some(password.as_ref().as_bytes()), None)
    }

    pub(crate) fn raw(&self) -> &[u8; 32] {
        &self.raw
    }
}

fn read_key_file(path: &Path) -> Result<Zeroizing<[u8; 32]>> {
    let data = Zeroizing::new(fs::read(path).map_err(|e| KpassError::KeyFile(path.into(), e))?);

    key_file_key(&data).map_err(|reason| {
        KpassError::KeyFile(
            PathBuf::from(path),
            io::Error::new(io::ErrorKind::InvalidData, reason),
        )
    })
}

/// Extracts the 32-byte key from the contents of a key file, following the
/// formats KeePass understands.
pub(crate) fn key_file_key(data: &[u8]) -> std::result::Result<Zeroizing<[u8; 32]>, String> {
    let mut key = Zeroizing::new([0u8; 32]);

    if let Some(doc) = xml_key_file(data) {
        let decoded = Zeroizing::new(doc?);
        key.copy_from_slice(&decoded);
        return Ok(key);
    }

    if data.len() == 32 {
        key.copy_from_slice(data);
        return Ok(key);
    }

    if data.len() == 64 {
        if let Ok(decoded) = HEXLOWER_PERMISSIVE.decode(data) {
            key.copy_from_slice(&decoded);
            return Ok(key);
        }
    }

    key.copy_from_slice(&crypto::sha256(&[data]));

    Ok(key)
}

/// `None` when `data` is not an XML key file at all.
fn xml_key_file(data: &[u8]) -> Option<std::result::Result<Vec<u8>, String>> {
    let text = std::str::from_utf8(data).ok()?;
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if !text.starts_with('<') {
        return None;
    }

    let doc = xml::parse(text.as_bytes()).ok()?;
    let root = doc.child("KeyFile")?;

    Some(decode_xml_key(root))
}

fn decode_xml_key(root: &xml::Node) -> std::result::Result<Vec<u8>, String> {
    let version = root
        .child("Meta")
        .and_then(|m| m.child("Version"))
        .map(|v| v.text.trim().to_owned())
        .unwrap_or_default();
    let data = root
        .child("Key")
        .and_then(|k| k.child("Data"))
        .ok_or_else(|| "key file has no Key/Data element".to_owned())?;

    let key = if version.starts_with("1.") {
        BASE64
            .decode(data.text.trim().as_bytes())
            .map_err(|e| format!("invalid base64 key: {}", e))?
    } else if version.starts_with("2.") {
        let hex = data
            .text
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>();
        let key = HEXLOWER_PERMISSIVE
            .decode(hex.as_bytes())
            .map_err(|e| format!("invalid hex key: {}", e))?;

        if let Some(expected) = data.attr("Hash") {
            let digest = crypto::sha256(&[key.as_slice()]);
            let actual = HEXUPPER.encode(&digest[..4]);
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err("key file hash mismatch".to_owned());
            }
        }

        key
    } else {
        return Err(format!("unsupported key file version '{}'", version));
    };

    if key.len() != 32 {
        return Err(format!("key is {} bytes, expected 32", key.len()));
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never(_: &str) -> io::Result<Zeroizing<String>> {
        panic!("prompt should not be called")
    }

    #[test]
    fn key_mode_names() {
        assert_eq!("ask".parse::<KeyMode>().unwrap(), KeyMode::Ask);
        assert_eq!(" Command ".parse::<KeyMode>().unwrap(), KeyMode::Command);
        assert!("bogus".parse::<KeyMode>().is_err());
        assert_eq!(KeyMode::Ignore.to_string(), "ignore");
    }

    #[test]
    fn mode_validation() {
        assert!(Credential::from_parts("x", Some(KeyMode::None), KeyMode::Command, true).is_err());
        assert!(Credential::from_parts("x", Some(KeyMode::Ask), KeyMode::Command, true).is_err());
        assert!(matches!(
            Credential::from_parts("", Some(KeyMode::Plaintext), KeyMode::Command, true),
            Err(KpassError::EmptyKey)
        ));
        assert!(matches!(
            Credential::from_parts(" ", None, KeyMode::Command, true),
            Err(KpassError::EmptyKey)
        ));
        assert!(Credential::from_parts("x", Some(KeyMode::Ignore), KeyMode::Command, true).is_ok());
        assert!(Credential::from_parts("", None, KeyMode::Ask, true).is_ok());
    }

    #[test]
    fn plaintext_and_ignored() {
        let cred = Credential::from_parts("p1", Some(KeyMode::Plaintext), KeyMode::Ask, false).unwrap();
        assert_eq!(cred.read(never).unwrap().unwrap().as_str(), "p1");

        let cred = Credential::from_parts("p1", Some(KeyMode::Ignore), KeyMode::Ask, false).unwrap();
        assert!(cred.read(never).unwrap().is_none());
    }

    #[test]
    fn command_output_is_trimmed() {
        let cred =
            Credential::from_parts("echo  hello ", Some(KeyMode::Command), KeyMode::Ask, false)
                .unwrap();
        assert_eq!(cred.read(never).unwrap().unwrap().as_str(), "hello");
    }

    #[test]
    fn command_failures() {
        let cred = Credential::from_parts("false", Some(KeyMode::Command), KeyMode::Ask, false).unwrap();
        assert!(matches!(cred.read(never), Err(KpassError::KeyCommandFailed(_))));

        let cred = Credential::from_parts("true", Some(KeyMode::Command), KeyMode::Ask, false).unwrap();
        assert!(matches!(cred.read(never), Err(KpassError::EmptyKey)));
    }

    #[test]
    fn ask_requires_interactive() {
        let cred = Credential::from_parts("", Some(KeyMode::Ask), KeyMode::Command, false).unwrap();
        assert!(matches!(cred.read(never), Err(KpassError::AskInNonInteractive)));

        let cred = Credential::from_parts("", Some(KeyMode::Ask), KeyMode::Command, true).unwrap();
        let password = cred
            .read(|prompt| {
                assert_eq!(prompt, PROMPT);
                Ok(Zeroizing::new("typed".to_owned()))
            })
            .unwrap();
        assert_eq!(password.unwrap().as_str(), "typed");
    }

    #[test]
    fn composite_key_needs_something() {
        assert!(matches!(CompositeKey::new(None, None), Err(KpassError::MissingCredentials)));
        assert!(matches!(
            CompositeKey::new(Some(&b""[..]), None),
            Err(KpassError::MissingCredentials)
        ));

        let a = CompositeKey::from_password("a").unwrap();
        let b = CompositeKey::from_password("b").unwrap();
        assert_ne!(a.raw(), b.raw());
    }

    #[test]
    fn key_file_formats() {
        let raw = [7u8; 32];
        assert_eq!(*key_file_key(&raw).unwrap(), raw);

        let hex = HEXLOWER_PERMISSIVE.encode(&raw);
        assert_eq!(*key_file_key(hex.as_bytes()).unwrap(), raw);

        let v1 = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<KeyFile><Meta><Version>1.00</Version></Meta>\
             <Key><Data>{}</Data></Key></KeyFile>",
            BASE64.encode(&raw)
        );
        assert_eq!(*key_file_key(v1.as_bytes()).unwrap(), raw);

        let hash = HEXUPPER.encode(&crypto::sha256(&[&raw[..]])[..4]);
        let v2 = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<KeyFile><Meta><Version>2.0</Version></Meta>\
             <Key><Data Hash=\"{}\">{} {}</Data></Key></KeyFile>",
            hash,
            &hex[..32],
            &hex[32..]
        );
        assert_eq!(*key_file_key(v2.as_bytes()).unwrap(), raw);

        let bad = v2.replace(&hash, "00000000");
        assert!(key_file_key(bad.as_bytes()).is_err());

        let other = b"just some bytes";
        assert_eq!(*key_file_key(other).unwrap(), crypto::sha256(&[&other[..]]));
    }
}
