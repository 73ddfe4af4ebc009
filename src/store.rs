//! Store engine
//!
//! # store
//!
//! A [`Transaction`] is the only way the store is read or changed. Every
//! operation resolves the credential, decodes the database, does its work
//! and (for mutations) seals the result back to disk atomically, with hooks
//! run around the write.

use std::fmt;
use std::io;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::consts::*;
use crate::credential::{self, CompositeKey, Credential, KeyMode};
use crate::error::KpassError;
use crate::hooks::{Action, Hook, Phase};
use crate::kdbx::{self, Database, Value};
use crate::path::{self, Pattern};
use crate::query::{Planner, QueryMode, QueryOptions, ValueMode};
use crate::totp;
use crate::Result;

/// A stored secret as seen through its path.
#[derive(Clone, PartialEq, Eq)]
pub struct Entity {
    pub path: String,
    pub secret: Zeroizing<String>,
    /// RFC 3339 time of the last insert or move.
    pub modtime: String,
    pub is_totp: bool,
}

impl Entity {
    pub fn new<P, S>(path: P, secret: S) -> Entity
    where
        P: AsRef<str>,
        S: Into<String>,
    {
        Entity {
            path: path::canonicalize(path),
            secret: Zeroizing::new(secret.into()),
            modtime: String::new(),
            is_totp: false,
        }
    }

    pub fn title(&self) -> String {
        path::base(&self.path)
    }

    pub fn directory(&self) -> String {
        path::directory(&self.path)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("path", &self.path)
            .field("secret", &"<redacted>")
            .field("modtime", &self.modtime)
            .field("is_totp", &self.is_totp)
            .finish()
    }
}

type Prompt = Box<dyn Fn(&str) -> io::Result<Zeroizing<String>>>;

pub struct Transaction {
    config: Config,
    prompt: Prompt,
}

impl Transaction {
    pub fn new(config: Config) -> Result<Transaction> {
        config.validate()?;

        Ok(Transaction {
            config,
            prompt: Box::new(credential::terminal_prompt),
        })
    }

    /// Replaces the terminal prompt used by [`KeyMode::Ask`].
    pub fn with_prompt<F>(mut self, prompt: F) -> Transaction
    where
        F: Fn(&str) -> io::Result<Zeroizing<String>> + 'static,
    {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds a credential for this transaction's configuration. Without a
    /// configured mode the key is a command to run.
    pub fn credential(&self) -> Result<Credential> {
        Credential::new(&self.config, KeyMode::Command)
    }

    fn key(&self, credential: &Credential, key_file: Option<&Path>) -> Result<CompositeKey> {
        credential.composite_key(key_file, |prompt| (self.prompt)(prompt))
    }

    fn planner(&self) -> Planner<'_> {
        Planner {
            totp_entry: &self.config.totp_entry,
            hash_length: self.config.hash_length,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.config.read_only {
            return Err(KpassError::ReadOnly);
        }

        Ok(())
    }

    /// `None` when the store does not exist yet.
    fn open_for_read(&self) -> Result<Option<Database>> {
        if !self.config.store.exists() {
            debug!("{} does not exist yet", self.config.store.display());
            return Ok(None);
        }

        let key = self.key(&self.credential()?, self.config.key_file.as_deref())?;
        let db = kdbx::open(&self.config.store, &key, &self.config.settings, false)?;

        Ok(Some(db))
    }

    /// A missing store is created in memory when `create` is set; it only
    /// reaches the disk once the mutation is sealed.
    fn open_for_write(&self, create: bool) -> Result<(Database, CompositeKey)> {
        let key = self.key(&self.credential()?, self.config.key_file.as_deref())?;

        if !self.config.store.exists() {
            if !create {
                return Err(KpassError::StoreNotFound(self.config.store.clone()));
            }

            debug!("starting new store at {}", self.config.store.display());
            return Ok((Database::new(&self.config.settings), key));
        }

        let db = kdbx::open(&self.config.store, &key, &self.config.settings, false)?;

        Ok((db, key))
    }

    fn seal(&self, db: &mut Database, key: &CompositeKey) -> Result<()> {
        kdbx::seal_and_write(db, &self.config.store, key)
    }

    /// The entity at `path`, if any.
    pub fn get<S>(&self, path: S, value_mode: ValueMode) -> Result<Option<Entity>>
    where
        S: AsRef<str>,
    {
        let (components, title) = path::split(path)?;
        let options = QueryOptions::new(QueryMode::Exact, value_mode, path::join(components, title));

        Ok(self.query(&options)?.pop())
    }

    /// Protected values are only decrypted when `options` asks for them.
    pub fn query(&self, options: &QueryOptions) -> Result<Vec<Entity>> {
        options.validate()?;

        let mut db = match self.open_for_read()? {
            Some(db) => db,
            None => return Ok(Vec::new()),
        };
        if options.value_mode != ValueMode::Blank {
            db.unlock()?;
        }

        self.planner().run(&db, options)
    }

    /// Every entity matched by `pattern`, with blank values.
    pub fn match_path<S>(&self, pattern: S) -> Result<Vec<Entity>>
    where
        S: AsRef<str>,
    {
        self.match_values(pattern, ValueMode::Blank)
    }

    /// Like [`Transaction::match_path`], filling in values per `value_mode`.
    pub fn match_values<S>(&self, pattern: S, value_mode: ValueMode) -> Result<Vec<Entity>>
    where
        S: AsRef<str>,
    {
        let pattern = Pattern::parse(pattern)?;
        let all = self.query(&QueryOptions::list(value_mode))?;

        Ok(all.into_iter().filter(|e| pattern.is_match(&e.path)).collect())
    }

    pub fn insert<P, S>(&self, path: P, secret: S) -> Result<()>
    where
        P: AsRef<str>,
        S: Into<String>,
    {
        let entity = Entity::new(path, secret);

        self.move_entry(&entity, &entity.path)
    }

    /// Stores `src.secret` at `dst`. When `dst` is `src.path` this is an
    /// insert (overwriting any existing entry); otherwise the entry at
    /// `src.path` must exist and is moved, replacing anything at `dst`.
    pub fn move_entry<S>(&self, src: &Entity, dst: S) -> Result<()>
    where
        S: AsRef<str>,
    {
        self.check_writable()?;

        if src.path.trim().is_empty() {
            return Err(KpassError::EmptyPath);
        }
        let secret = src.secret.trim();
        if secret.is_empty() {
            return Err(KpassError::EmptySecret);
        }

        let (src_dir, src_title) = path::split(&src.path)?;
        let (dst_dir, dst_title) = path::check_entry_path(dst)?;
        let src_path = path::join(&src_dir, &src_title);
        let dst_path = path::join(&dst_dir, &dst_title);

        if RESERVED_FIELDS.contains(&dst_title.as_str()) {
            return Err(KpassError::ReservedField(dst_title));
        }

        let action = if src_path == dst_path {
            Action::Insert
        } else {
            Action::Move
        };
        let is_totp = totp::is_totp_title(&dst_title, &self.config.totp_entry);
        if is_totp && secret.contains('\n') {
            return Err(KpassError::TotpMultiLine);
        }

        let hook = Hook::new(&src_path, action, self.config.hook_dir.as_deref())?;
        let modtime = self.modtime();
        let entry = self.build_entry(&dst_title, secret, is_totp, modtime)?;

        let (mut db, key) = match self.open_for_write(action == Action::Insert) {
            Err(KpassError::StoreNotFound(_)) => return Err(KpassError::EntityNotFound(src_path)),
            other => other?,
        };
        if action == Action::Move && db.root.entries_titled(&src_dir, &src_title).is_empty() {
            return Err(KpassError::EntityNotFound(src_path));
        }

        hook.run(Phase::Pre)?;

        db.root.remove_entries(&src_dir, &src_title);
        if action == Action::Move {
            db.root.remove_entries(&dst_dir, &dst_title);
        }
        db.root.ensure(&dst_dir).entries.push(entry);

        self.seal(&mut db, &key)?;
        debug!("{} {} -> {}", action, src_path, dst_path);

        hook.run(Phase::Post)
    }

    fn modtime(&self) -> DateTime<Utc> {
        match &self.config.modtime {
            Some(over) => match DateTime::parse_from_rfc3339(over.trim()) {
                Ok(time) => time.with_timezone(&Utc),
                Err(e) => {
                    warn!("ignoring invalid modtime override '{}': {}", over, e);
                    Utc::now()
                }
            },
            None => Utc::now(),
        }
    }

    fn build_entry(
        &self,
        title: &str,
        secret: &str,
        is_totp: bool,
        modtime: DateTime<Utc>,
    ) -> Result<kdbx::Entry> {
        let mut entry = kdbx::Entry::new(modtime);

        entry.set(TITLE_FIELD, Value::Plain(title.to_owned()));
        if secret.contains('\n') {
            entry.set(NOTES_FIELD, Value::protected(secret));
        } else {
            entry.set(PASSWORD_FIELD, Value::protected(secret));
        }
        if is_totp {
            let url = Zeroizing::new(totp::format_url(&self.config.totp_format, secret)?);
            entry.set(OTP_FIELD, Value::protected(&*url));
        }
        entry.set(
            MODTIME_FIELD,
            Value::Plain(modtime.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        Ok(entry)
    }

    pub fn remove(&self, entity: &Entity) -> Result<()> {
        self.remove_all(std::slice::from_ref(entity))
    }

    /// Removes every entity or none of them: all of them must exist before
    /// the pre-hooks run.
    pub fn remove_all(&self, entities: &[Entity]) -> Result<()> {
        self.check_writable()?;

        if entities.is_empty() {
            return Err(KpassError::EmptyPath);
        }

        let targets = entities
            .iter()
            .map(|e| path::split(&e.path).map(|(dir, title)| (path::join(&dir, &title), dir, title)))
            .collect::<Result<Vec<_>>>()?;
        let hooks = targets
            .iter()
            .map(|(p, _, _)| Hook::new(p, Action::Remove, self.config.hook_dir.as_deref()))
            .collect::<Result<Vec<_>>>()?;

        let (mut db, key) = match self.open_for_write(false) {
            Err(KpassError::StoreNotFound(_)) => {
                return Err(KpassError::EntityNotFound(targets[0].0.clone()))
            }
            other => other?,
        };

        if let Some((p, _, _)) = targets
            .iter()
            .find(|(_, dir, title)| db.root.entries_titled(dir, title).is_empty())
        {
            return Err(KpassError::EntityNotFound(p.clone()));
        }

        for hook in &hooks {
            hook.run(Phase::Pre)?;
        }

        for (p, dir, title) in &targets {
            db.root.remove_entries(dir, title);
            debug!("remove {}", p);
        }

        self.seal(&mut db, &key)?;

        // the removal is already durable; report the first post-hook failure
        let mut result = Ok(());
        for hook in &hooks {
            if let Err(e) = hook.run(Phase::Post) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result
    }

    /// Re-encrypts the store under `credential` and `key_file`, using the
    /// configured cipher and KDF settings. The whole tree is carried over as
    /// it is: groups and entries keep their UUIDs and times, and attachments
    /// and modtimes are kept too.
    pub fn rekey(&self, credential: &Credential, key_file: Option<&Path>) -> Result<()> {
        self.check_writable()?;

        let (mut db, _) = self.open_for_write(false)?;
        db.unlock()?;
        let new_key = self.key(credential, key_file)?;

        db.apply_settings(&self.config.settings);
        self.seal(&mut db, &new_key)?;
        debug!("rekeyed {} entries", db.root.walk().len());

        Ok(())
    }
}
