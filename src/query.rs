//! Query planner
//!
//! # query
//!
//! Evaluates [`QueryOptions`] over a decoded store, yielding [`Entity`]s
//! whose `secret` is filled in according to the requested [`ValueMode`].

use std::str::FromStr;

use data_encoding::HEXLOWER;
use log::warn;
use ring::digest;
use zeroize::Zeroizing;

use crate::consts::*;
use crate::error::KpassError;
use crate::kdbx::{self, Database};
use crate::path;
use crate::store::Entity;
use crate::totp;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Every entry.
    List,
    /// Entries whose path contains the criteria.
    Find,
    /// The entry whose path is the criteria.
    Exact,
    /// Entries whose path ends with the criteria.
    Suffix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMode {
    Blank,
    Hashed,
    Secret,
}

impl FromStr for ValueMode {
    type Err = KpassError;

    fn from_str(s: &str) -> Result<ValueMode> {
        match s.to_lowercase().as_ref() {
            "blank" => Ok(ValueMode::Blank),
            "hashed" | "hash" => Ok(ValueMode::Hashed),
            "secret" => Ok(ValueMode::Secret),
            other => Err(KpassError::Config("value mode", other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub mode: QueryMode,
    pub value_mode: ValueMode,
    pub criteria: String,
}

impl QueryOptions {
    pub fn new<S>(mode: QueryMode, value_mode: ValueMode, criteria: S) -> QueryOptions
    where
        S: Into<String>,
    {
        QueryOptions {
            mode,
            value_mode,
            criteria: criteria.into(),
        }
    }

    pub fn list(value_mode: ValueMode) -> QueryOptions {
        QueryOptions::new(QueryMode::List, value_mode, "")
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode != QueryMode::List && self.criteria.is_empty() {
            return Err(KpassError::MissingCriteria);
        }

        Ok(())
    }

    fn retains(&self, path: &str) -> bool {
        match self.mode {
            QueryMode::List => true,
            QueryMode::Find => path.contains(&self.criteria),
            QueryMode::Exact => path == path::canonicalize(&self.criteria),
            QueryMode::Suffix => path.ends_with(&self.criteria),
        }
    }
}

/// What the planner needs from the configuration.
#[derive(Debug, Clone)]
pub struct Planner<'a> {
    pub totp_entry: &'a str,
    pub hash_length: usize,
}

impl Planner<'_> {
    /// Runs `options` against `db`, sorted by path. Secrets are read from
    /// `db` as is, so it must be unlocked unless `value_mode` is `Blank`.
    pub fn run(&self, db: &Database, options: &QueryOptions) -> Result<Vec<Entity>> {
        options.validate()?;

        let mut results = Vec::new();
        for (components, entry) in db.root.walk() {
            let title = match entry.title() {
                Some(title) if !title.is_empty() => title,
                _ => continue,
            };
            if components.is_empty() {
                warn!("skipping entry '{}' stored directly under the root group", title);
                continue;
            }
            let slashed = |name: &str| name.contains(path::SEPARATOR);
            if slashed(title) || components.iter().any(|c| slashed(c)) {
                warn!(
                    "skipping entry '{}' in '{}': names may not contain '{}'",
                    title,
                    components.join(" > "),
                    path::SEPARATOR
                );
                continue;
            }

            let path = path::join(&components, title);
            if !options.retains(&path) {
                continue;
            }

            results.push(self.entity(path, title, entry, options.value_mode)?);
        }

        results.sort_by(|a, b| a.path.cmp(&b.path));
        if options.mode == QueryMode::Exact && results.len() > 1 {
            return Err(KpassError::Ambiguous(options.criteria.clone()));
        }

        Ok(results)
    }

    fn entity(&self, path: String, title: &str, entry: &kdbx::Entry, mode: ValueMode) -> Result<Entity> {
        let secret = match mode {
            ValueMode::Blank => Zeroizing::new(String::new()),
            ValueMode::Secret => secret_of(entry)?,
            ValueMode::Hashed => Zeroizing::new(self.hash(&secret_of(entry)?)),
        };

        Ok(Entity {
            is_totp: totp::is_totp_title(title, self.totp_entry),
            modtime: modtime_of(entry),
            path,
            secret,
        })
    }

    /// SHA-512 hex digest, truncated to the configured hash length.
    pub fn hash(&self, value: &str) -> String {
        let mut hex = HEXLOWER.encode(digest::digest(&digest::SHA512, value.as_bytes()).as_ref());
        if self.hash_length > 0 {
            hex.truncate(self.hash_length);
        }

        hex
    }
}

/// The stored secret: the password, or the notes for multi-line values.
pub(crate) fn secret_of(entry: &kdbx::Entry) -> Result<Zeroizing<String>> {
    let pick = |key| {
        entry
            .value(key)
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| KpassError::CorruptDatabase(format!("unreadable {} field", key)))
            })
            .transpose()
    };

    let secret = match pick(PASSWORD_FIELD)? {
        Some(password) if !password.is_empty() => password,
        _ => pick(NOTES_FIELD)?.unwrap_or_default(),
    };

    Ok(Zeroizing::new(secret.to_owned()))
}

pub(crate) fn modtime_of(entry: &kdbx::Entry) -> String {
    match entry.get(MODTIME_FIELD) {
        Some(modtime) if !modtime.is_empty() => modtime.to_owned(),
        _ => entry.times.last_modification.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::kdbx::{Settings, Value};

    fn db(paths: &[(&str, &str)]) -> Database {
        let mut db = Database::new(&Settings::default());
        for (p, secret) in paths {
            let (components, title) = path::split(p).unwrap();
            let mut entry = kdbx::Entry::new(Utc::now());
            entry.set(TITLE_FIELD, Value::Plain(title));
            if secret.contains('\n') {
                entry.set(NOTES_FIELD, Value::protected(secret));
            } else {
                entry.set(PASSWORD_FIELD, Value::protected(secret));
            }
            entry.set(MODTIME_FIELD, Value::Plain("2020-01-01T00:00:00+00:00".to_owned()));
            db.root.ensure(&components).entries.push(entry);
        }
        db
    }

    fn planner() -> Planner<'static> {
        Planner {
            totp_entry: "totp",
            hash_length: 0,
        }
    }

    fn paths(entities: &[Entity]) -> Vec<&str> {
        entities.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn modes() {
        let db = db(&[("b/x", "1"), ("a/y/totp", "2"), ("a/x", "3")]);
        let run = |mode, criteria: &str| {
            planner()
                .run(&db, &QueryOptions::new(mode, ValueMode::Blank, criteria))
                .unwrap()
        };

        assert_eq!(paths(&run(QueryMode::List, "")), vec!["a/x", "a/y/totp", "b/x"]);
        assert_eq!(paths(&run(QueryMode::Find, "x")), vec!["a/x", "b/x"]);
        assert_eq!(paths(&run(QueryMode::Exact, "/a/x/")), vec!["a/x"]);
        assert!(run(QueryMode::Exact, "a").is_empty());
        assert_eq!(paths(&run(QueryMode::Suffix, "totp")), vec!["a/y/totp"]);

        let totp = run(QueryMode::Suffix, "totp");
        assert!(totp[0].is_totp);
        assert_eq!(totp[0].modtime, "2020-01-01T00:00:00+00:00");
        assert!(totp[0].secret.is_empty());
    }

    #[test]
    fn criteria_required() {
        let db = db(&[]);
        assert!(matches!(
            planner().run(&db, &QueryOptions::new(QueryMode::Find, ValueMode::Blank, "")),
            Err(KpassError::MissingCriteria)
        ));
    }

    #[test]
    fn value_modes() {
        let db = db(&[("a/one", "secret"), ("a/two", "multi\nline")]);
        let opts = |vm| QueryOptions::new(QueryMode::Exact, vm, "a/one");

        let secret = planner().run(&db, &opts(ValueMode::Secret)).unwrap();
        assert_eq!(secret[0].secret.as_str(), "secret");

        let hashed = planner().run(&db, &opts(ValueMode::Hashed)).unwrap();
        assert_eq!(hashed[0].secret.len(), 128);
        assert_eq!(hashed[0].secret.as_str(), planner().hash("secret"));

        let short = Planner {
            hash_length: 12,
            ..planner()
        };
        let hashed = short.run(&db, &opts(ValueMode::Hashed)).unwrap();
        assert_eq!(hashed[0].secret.as_str(), &planner().hash("secret")[..12]);

        let notes = planner()
            .run(&db, &QueryOptions::new(QueryMode::Exact, ValueMode::Secret, "a/two"))
            .unwrap();
        assert_eq!(notes[0].secret.as_str(), "multi\nline");
    }

    #[test]
    fn duplicates_are_ambiguous() {
        let db = db(&[("a/one", "x"), ("a/one", "y")]);
        assert!(matches!(
            planner().run(&db, &QueryOptions::new(QueryMode::Exact, ValueMode::Blank, "a/one")),
            Err(KpassError::Ambiguous(_))
        ));
    }

    #[test]
    fn names_with_separators_are_skipped() {
        let mut db = db(&[("a/ok", "x")]);
        let mut slashed = kdbx::Entry::new(Utc::now());
        slashed.set(TITLE_FIELD, Value::Plain("b/c".to_owned()));
        db.root.ensure(&["a".to_owned()]).entries.push(slashed);
        let mut inside = kdbx::Entry::new(Utc::now());
        inside.set(TITLE_FIELD, Value::Plain("d".to_owned()));
        db.root.ensure(&["x/y".to_owned()]).entries.push(inside);

        let all = planner().run(&db, &QueryOptions::list(ValueMode::Blank)).unwrap();
        assert_eq!(paths(&all), vec!["a/ok"]);
    }
}
