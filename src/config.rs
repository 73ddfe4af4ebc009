//! Configuration
//!
//! # config
//!
//! Everything the engine needs to know about its environment lives in a
//! [`Config`]. In production it is read from `KPASS_*` environment variables;
//! tests build one by hand or feed [`Config::from_lookup`] a map.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::consts::*;
use crate::credential::KeyMode;
use crate::error::KpassError;
use crate::kdbx::{Cipher, KdfSettings, Settings};
use crate::Result;

#[derive(Clone)]
pub struct Config {
    /// Location of the database file.
    pub store: PathBuf,
    /// Literal password or key command, depending on `key_mode`.
    pub key: Zeroizing<String>,
    /// Unset means "use the caller's default mode".
    pub key_mode: Option<KeyMode>,
    pub key_file: Option<PathBuf>,
    /// Title segment that marks an entry as a TOTP seed.
    pub totp_entry: String,
    /// otpauth URL template with a single `%s` for the seed.
    pub totp_format: String,
    /// RFC 3339 timestamp used instead of the wall clock for modtimes.
    pub modtime: Option<String>,
    pub hook_dir: Option<PathBuf>,
    pub read_only: bool,
    pub interactive: bool,
    /// Truncation length for hashed values; zero keeps the full digest.
    pub hash_length: usize,
    pub clip_timeout: u64,
    pub x_selection: String,
    /// Encryption settings used for newly created (or rekeyed) stores.
    pub settings: Settings,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            store: PathBuf::from(&*HOME).join(DEFAULT_STORE_NAME),
            key: Zeroizing::new(String::new()),
            key_mode: None,
            key_file: None,
            totp_entry: DEFAULT_TOTP_ENTRY.to_owned(),
            totp_format: DEFAULT_TOTP_FORMAT.to_owned(),
            modtime: None,
            hook_dir: None,
            read_only: false,
            interactive: true,
            hash_length: 0,
            clip_timeout: DEFAULT_CLIP_TIMEOUT,
            x_selection: DEFAULT_X_SELECTION.to_owned(),
            settings: Settings::default(),
        }
    }
}

// keep the key out of debug output
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("store", &self.store)
            .field("key", &"<redacted>")
            .field("key_mode", &self.key_mode)
            .field("key_file", &self.key_file)
            .field("totp_entry", &self.totp_entry)
            .field("totp_format", &self.totp_format)
            .field("modtime", &self.modtime)
            .field("hook_dir", &self.hook_dir)
            .field("read_only", &self.read_only)
            .field("interactive", &self.interactive)
            .field("hash_length", &self.hash_length)
            .field("clip_timeout", &self.clip_timeout)
            .field("x_selection", &self.x_selection)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a configuration from `lookup`, which maps variable names to
    /// values. Unset and empty variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(store) = get(KPASS_STORE) {
            config.store = PathBuf::from(expand_home(&store));
        }
        if let Some(key) = lookup(KPASS_KEY) {
            config.key = Zeroizing::new(key);
        }
        if let Some(mode) = get(KPASS_KEY_MODE) {
            config.key_mode = Some(mode.parse()?);
        }
        if let Some(key_file) = get(KPASS_KEY_FILE) {
            config.key_file = Some(PathBuf::from(expand_home(&key_file)));
        }
        if let Some(entry) = get(KPASS_TOTP_ENTRY) {
            config.totp_entry = entry;
        }
        if let Some(format) = get(KPASS_TOTP_FORMAT) {
            config.totp_format = format;
        }
        config.modtime = get(KPASS_MODTIME);
        if let Some(dir) = get(KPASS_HOOK_DIR) {
            config.hook_dir = Some(PathBuf::from(expand_home(&dir)));
        }
        if let Some(flag) = get(KPASS_READONLY) {
            config.read_only = parse_bool(KPASS_READONLY, &flag)?;
        }
        if let Some(flag) = get(KPASS_INTERACTIVE) {
            config.interactive = parse_bool(KPASS_INTERACTIVE, &flag)?;
        }
        if let Some(len) = get(KPASS_HASH_LENGTH) {
            config.hash_length = parse_num(KPASS_HASH_LENGTH, &len)?;
        }
        if let Some(timeout) = get(KPASS_CLIP_TIMEOUT) {
            config.clip_timeout = parse_num(KPASS_CLIP_TIMEOUT, &timeout)?;
        }
        if let Some(sel) = get(KPASS_X_SELECTION) {
            config.x_selection = match sel.as_ref() {
                "p" | "primary" => "primary".to_owned(),
                "sec" | "secondary" => "secondary".to_owned(),
                _ => DEFAULT_X_SELECTION.to_owned(),
            };
        }
        if let Some(cipher) = get(KPASS_CIPHER) {
            config.settings.cipher = match cipher.to_lowercase().as_ref() {
                "aes" | "aes256" => Cipher::Aes256,
                "chacha20" => Cipher::ChaCha20,
                other => return Err(KpassError::Config(KPASS_CIPHER, other.to_owned())),
            };
        }
        config.settings.kdf = kdf_settings(&get)?;

        config.validate()?;

        Ok(config)
    }

    /// Checks the invariants that do not depend on the store's contents.
    pub fn validate(&self) -> Result<()> {
        if self.totp_entry.trim().is_empty() {
            return Err(KpassError::Config(KPASS_TOTP_ENTRY, "must not be empty".to_owned()));
        }
        if RESERVED_FIELDS.contains(&self.totp_entry.as_str()) {
            return Err(KpassError::ReservedField(self.totp_entry.clone()));
        }
        if self.totp_format.matches("%s").count() != 1 {
            return Err(KpassError::Config(
                KPASS_TOTP_FORMAT,
                "must contain exactly one %s".to_owned(),
            ));
        }
        if let KdfSettings::Argon2d { memory_kib, .. } | KdfSettings::Argon2id { memory_kib, .. } =
            self.settings.kdf
        {
            // stored in bytes in the header
            if memory_kib.checked_mul(1024).is_none() {
                return Err(KpassError::Config(KPASS_KDF_MEMORY, memory_kib.to_string()));
            }
        }

        Ok(())
    }
}

fn kdf_settings<F>(get: &F) -> Result<KdfSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let kind = get(KPASS_KDF).unwrap_or_else(|| "argon2d".to_owned());
    let iterations = get(KPASS_KDF_ITERATIONS)
        .map(|v| parse_num::<u64>(KPASS_KDF_ITERATIONS, &v))
        .transpose()?;
    let memory = get(KPASS_KDF_MEMORY)
        .map(|v| parse_num::<u64>(KPASS_KDF_MEMORY, &v))
        .transpose()?
        .unwrap_or(DEFAULT_ARGON2_MEMORY_KIB);
    let parallelism = get(KPASS_KDF_PARALLELISM)
        .map(|v| parse_num::<u32>(KPASS_KDF_PARALLELISM, &v))
        .transpose()?
        .unwrap_or(DEFAULT_ARGON2_PARALLELISM);

    let settings = match kind.to_lowercase().as_ref() {
        "argon2d" => KdfSettings::Argon2d {
            memory_kib: memory,
            iterations: iterations.unwrap_or(DEFAULT_ARGON2_ITERATIONS),
            parallelism,
        },
        "argon2id" => KdfSettings::Argon2id {
            memory_kib: memory,
            iterations: iterations.unwrap_or(DEFAULT_ARGON2_ITERATIONS),
            parallelism,
        },
        "aes" | "aes-kdf" => KdfSettings::Aes {
            rounds: iterations.unwrap_or(DEFAULT_AES_KDF_ROUNDS),
        },
        other => return Err(KpassError::Config(KPASS_KDF, other.to_owned())),
    };

    Ok(settings)
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_ref() {
        "yes" | "true" | "1" | "on" => Ok(true),
        "no" | "false" | "0" | "off" => Ok(false),
        other => Err(KpassError::Config(name, other.to_owned())),
    }
}

fn parse_num<T>(name: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|_| KpassError::Config(name, value.to_owned()))
}

fn expand_home(path: &str) -> String {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("{}{}", *HOME, rest),
        _ => path.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> Result<Config> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();

        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = lookup(&[]).unwrap();

        assert_eq!(config.totp_entry, "totp");
        assert!(!config.read_only);
        assert!(config.interactive);
        assert_eq!(config.hash_length, 0);
        assert!(config.key_mode.is_none());
    }

    #[test]
    fn parses_values() {
        let config = lookup(&[
            ("KPASS_STORE", "/tmp/x.kdbx"),
            ("KPASS_KEY_MODE", "plaintext"),
            ("KPASS_KEY", "secret"),
            ("KPASS_READONLY", "yes"),
            ("KPASS_HASH_LENGTH", "12"),
            ("KPASS_KDF", "aes"),
            ("KPASS_KDF_ITERATIONS", "10"),
        ])
        .unwrap();

        assert_eq!(config.store, PathBuf::from("/tmp/x.kdbx"));
        assert_eq!(config.key_mode, Some(KeyMode::Plaintext));
        assert_eq!(config.key.as_str(), "secret");
        assert!(config.read_only);
        assert_eq!(config.hash_length, 12);
        assert_eq!(config.settings.kdf, KdfSettings::Aes { rounds: 10 });
    }

    #[test]
    fn rejects_bad_values() {
        assert!(lookup(&[("KPASS_READONLY", "maybe")]).is_err());
        assert!(lookup(&[("KPASS_HASH_LENGTH", "-1")]).is_err());
        assert!(lookup(&[("KPASS_KEY_MODE", "sideways")]).is_err());
        assert!(lookup(&[("KPASS_TOTP_FORMAT", "otpauth://totp/x")]).is_err());
    }

    #[test]
    fn kdf_memory_must_fit_in_bytes() {
        let max = u64::MAX.to_string();
        match lookup(&[("KPASS_KDF_MEMORY", max.as_str())]) {
            Err(KpassError::Config(name, value)) => {
                assert_eq!(name, "KPASS_KDF_MEMORY");
                assert_eq!(value, max);
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }

        let config = lookup(&[("KPASS_KDF", "argon2id"), ("KPASS_KDF_MEMORY", "1024")]).unwrap();
        assert!(matches!(
            config.settings.kdf,
            KdfSettings::Argon2id { memory_kib: 1024, .. }
        ));

        let mut config = lookup(&[]).unwrap();
        config.settings.kdf = KdfSettings::Argon2d {
            memory_kib: u64::MAX / 512,
            iterations: 1,
            parallelism: 1,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn reserved_totp_entry() {
        match lookup(&[("KPASS_TOTP_ENTRY", "Password")]) {
            Err(KpassError::ReservedField(name)) => assert_eq!(name, "Password"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn debug_hides_key() {
        let config = lookup(&[("KPASS_KEY", "hunter2")]).unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
