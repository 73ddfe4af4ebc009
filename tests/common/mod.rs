#![allow(dead_code)]

use std::path::{Path, PathBuf};

use kpass::config::Config;
use kpass::credential::KeyMode;
use kpass::kdbx::{Cipher, KdfSettings, Settings};
use kpass::store::Transaction;
use tempfile::TempDir;
use zeroize::Zeroizing;

pub fn cheap_settings() -> Settings {
    Settings {
        cipher: Cipher::ChaCha20,
        compress: true,
        kdf: KdfSettings::Aes { rounds: 10 },
    }
}

pub fn config(dir: &Path, password: &str) -> Config {
    Config {
        store: dir.join("store.kdbx"),
        key: Zeroizing::new(password.to_owned()),
        key_mode: Some(KeyMode::Plaintext),
        interactive: false,
        settings: cheap_settings(),
        ..Config::default()
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub tx: Transaction,
}

impl Fixture {
    pub fn new() -> Fixture {
        Fixture::with(|_| {})
    }

    pub fn with<F>(f: F) -> Fixture
    where
        F: FnOnce(&mut Config),
    {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), "hunter2");
        f(&mut config);

        Fixture {
            tx: Transaction::new(config).unwrap(),
            dir,
        }
    }

    pub fn store(&self) -> PathBuf {
        self.tx.config().store.clone()
    }
}
