//! KDBX 4 database codec
//!
//! # kdbx
//!
//! Decodes a KDBX 4 file into a [`Database`] (metadata plus a single root
//! [`Group`]), and seals it back to disk. Protected values stay encrypted
//! under the inner random stream until [`Database::unlock`] is called;
//! sealing always re-encrypts them under a fresh stream.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use crate::consts::*;
use crate::credential::CompositeKey;
use crate::error::KpassError;
use crate::Result;

pub mod crypto;
pub mod header;
pub mod xml;

use self::crypto::{InnerStream, PayloadKeys};
use self::header::{Binary, InnerHeader, KdfParams, OuterHeader};
use self::xml::Node;

pub(crate) fn corrupt<S>(msg: S) -> KpassError
where
    S: Into<String>,
{
    KpassError::CorruptDatabase(msg.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    Aes256,
    ChaCha20,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KdfSettings {
    Argon2d {
        memory_kib: u64,
        iterations: u64,
        parallelism: u32,
    },
    Argon2id {
        memory_kib: u64,
        iterations: u64,
        parallelism: u32,
    },
    Aes {
        rounds: u64,
    },
}

/// Encryption settings for newly created databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub cipher: Cipher,
    pub compress: bool,
    pub kdf: KdfSettings,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            cipher: Cipher::Aes256,
            compress: true,
            kdf: KdfSettings::Argon2d {
                memory_kib: DEFAULT_ARGON2_MEMORY_KIB,
                iterations: DEFAULT_ARGON2_ITERATIONS,
                parallelism: DEFAULT_ARGON2_PARALLELISM,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Times {
    pub creation: DateTime<Utc>,
    pub last_modification: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub expires: bool,
    pub usage_count: u64,
    pub location_changed: DateTime<Utc>,
}

impl Times {
    pub fn at(time: DateTime<Utc>) -> Times {
        Times {
            creation: time,
            last_modification: time,
            last_access: time,
            expiry: time,
            expires: false,
            usage_count: 0,
            location_changed: time,
        }
    }
}

impl Default for Times {
    fn default() -> Times {
        Times::at(Utc::now())
    }
}

/// A value stored under the inner random stream. `offset` is the value's
/// position in the keystream while it is still encrypted.
#[derive(Clone)]
pub struct Protected {
    pub(crate) bytes: Zeroizing<Vec<u8>>,
    pub(crate) offset: Option<usize>,
}

impl std::fmt::Debug for Protected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protected")
            .field("len", &self.bytes.len())
            .field("offset", &self.offset)
            .finish()
    }
}

#[derive(Clone)]
pub enum Value {
    Plain(String),
    Protected(Protected),
}

impl Value {
    pub fn protected<S>(value: S) -> Value
    where
        S: AsRef<str>,
    {
        Value::Protected(Protected {
            bytes: Zeroizing::new(value.as_ref().as_bytes().to_vec()),
            offset: None,
        })
    }

    /// `None` while a protected value is still locked.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Plain(s) => Some(s.as_str()),
            Value::Protected(p) if p.offset.is_none() => std::str::from_utf8(&p.bytes).ok(),
            Value::Protected(_) => None,
        }
    }
}

// never print protected contents
impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Plain(s) => f.debug_tuple("Plain").field(s).finish(),
            Value::Protected(_) => f.write_str("Protected(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub uuid: [u8; 16],
    pub icon: u32,
    pub times: Times,
    pub fields: Vec<Field>,
    pub history: Vec<Entry>,
    /// Elements kpass does not model (tags, attachment references, auto-type
    /// and the like), written back untouched.
    pub extra: Vec<Node>,
}

impl Entry {
    pub fn new(time: DateTime<Utc>) -> Entry {
        Entry {
            uuid: new_uuid(),
            icon: 0,
            times: Times::at(time),
            fields: Vec::new(),
            history: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(Value::as_str)
    }

    pub fn set<S>(&mut self, key: S, value: Value)
    where
        S: Into<String>,
    {
        let key = key.into();
        match self.fields.iter_mut().find(|f| f.key == key) {
            Some(field) => field.value = value,
            None => self.fields.push(Field { key, value }),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.get(TITLE_FIELD)
    }

    fn try_for_each_protected_mut(&mut self, f: &mut dyn FnMut(&mut Protected) -> Result<()>) -> Result<()> {
        for field in &mut self.fields {
            if let Value::Protected(p) = &mut field.value {
                f(p)?;
            }
        }
        for node in &mut self.extra {
            node.try_for_each_protected_mut(f)?;
        }
        for old in &mut self.history {
            old.try_for_each_protected_mut(f)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub uuid: [u8; 16],
    pub name: String,
    pub icon: u32,
    pub times: Times,
    pub groups: Vec<Group>,
    pub entries: Vec<Entry>,
    pub extra: Vec<Node>,
}

impl Group {
    pub fn new<S>(name: S) -> Group
    where
        S: Into<String>,
    {
        Group {
            uuid: new_uuid(),
            name: name.into(),
            icon: 48,
            times: Times::default(),
            groups: Vec::new(),
            entries: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.entries.is_empty()
    }

    /// Every group reached by descending through child groups named by
    /// `path`. Sibling groups sharing a name are all followed, the same way
    /// [`Group::walk`] reaches them.
    pub fn groups_at(&self, path: &[String]) -> Vec<&Group> {
        match path.split_first() {
            None => vec![self],
            Some((head, rest)) => self
                .groups
                .iter()
                .filter(|g| g.name == *head)
                .flat_map(|g| g.groups_at(rest))
                .collect(),
        }
    }

    fn for_each_group_at_mut(&mut self, path: &[String], f: &mut dyn FnMut(&mut Group)) {
        match path.split_first() {
            None => f(self),
            Some((head, rest)) => {
                for group in self.groups.iter_mut().filter(|g| g.name == *head) {
                    group.for_each_group_at_mut(rest, f);
                }
            }
        }
    }

    /// Descends to the first group named by `path`, creating missing groups
    /// along the way.
    pub fn ensure(&mut self, path: &[String]) -> &mut Group {
        let (head, rest) = match path.split_first() {
            Some(split) => split,
            None => return self,
        };

        let idx = match self.groups.iter().position(|g| g.name == *head) {
            Some(idx) => idx,
            None => {
                self.groups.push(Group::new(head.clone()));
                self.groups.len() - 1
            }
        };

        self.groups[idx].ensure(rest)
    }

    /// Entries in the groups at `path` whose title is `title`.
    pub fn entries_titled(&self, path: &[String], title: &str) -> Vec<&Entry> {
        self.groups_at(path)
            .into_iter()
            .flat_map(|g| g.entries.iter().filter(move |e| e.title() == Some(title)))
            .collect()
    }

    /// Detaches every entry titled `title` from the groups at `path`, then
    /// drops groups along `path` that were left empty.
    pub fn remove_entries(&mut self, path: &[String], title: &str) -> Vec<Entry> {
        let mut removed = Vec::new();
        self.for_each_group_at_mut(path, &mut |group| {
            let (gone, kept): (Vec<Entry>, Vec<Entry>) = group
                .entries
                .drain(..)
                .partition(|e| e.title() == Some(title));
            group.entries = kept;
            removed.extend(gone);
        });

        if !removed.is_empty() {
            self.prune(path);
        }

        removed
    }

    /// Removes empty groups along `path`, deepest first. The group this is
    /// called on is never removed.
    pub fn prune(&mut self, path: &[String]) {
        let (head, rest) = match path.split_first() {
            Some(split) => split,
            None => return,
        };

        for group in self.groups.iter_mut().filter(|g| g.name == *head) {
            group.prune(rest);
        }
        self.groups.retain(|g| {
            let pruned = g.name == *head && g.is_empty();
            if pruned {
                debug!("pruning empty group {}", head);
            }
            !pruned
        });
    }

    /// Every entry below this group along with the names of the groups
    /// leading to it (this group excluded).
    pub fn walk(&self) -> Vec<(Vec<String>, &Entry)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.walk_into(&mut prefix, &mut out);
        out
    }

    fn walk_into<'a>(&'a self, prefix: &mut Vec<String>, out: &mut Vec<(Vec<String>, &'a Entry)>) {
        for entry in &self.entries {
            out.push((prefix.clone(), entry));
        }
        for group in &self.groups {
            prefix.push(group.name.clone());
            group.walk_into(prefix, out);
            prefix.pop();
        }
    }

    fn try_for_each_protected_mut(&mut self, f: &mut dyn FnMut(&mut Protected) -> Result<()>) -> Result<()> {
        for node in &mut self.extra {
            node.try_for_each_protected_mut(f)?;
        }
        for entry in &mut self.entries {
            entry.try_for_each_protected_mut(f)?;
        }
        for group in &mut self.groups {
            group.try_for_each_protected_mut(f)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Meta {
    pub generator: String,
    pub database_name: String,
    pub database_name_changed: DateTime<Utc>,
    pub recycle_bin_enabled: bool,
    pub extra: Vec<Node>,
}

impl Default for Meta {
    fn default() -> Meta {
        Meta {
            generator: "kpass".to_owned(),
            database_name: String::new(),
            database_name_changed: Utc::now(),
            recycle_bin_enabled: false,
            extra: Vec::new(),
        }
    }
}

/// Keystream state needed to decrypt protected values after decoding.
struct Lock {
    stream_id: u32,
    key: Zeroizing<Vec<u8>>,
    len: usize,
}

pub struct Database {
    cipher: Cipher,
    compressed: bool,
    kdf: KdfParams,
    public_custom_data: Option<Vec<u8>>,
    pub meta: Meta,
    pub root: Group,
    /// Attachments from the inner header, referenced by index from entries.
    pub binaries: Vec<Binary>,
    trailer: Vec<Node>,
    lock: Option<Lock>,
}

impl Database {
    /// An empty database with a single root group.
    pub fn new(settings: &Settings) -> Database {
        Database {
            cipher: settings.cipher,
            compressed: settings.compress,
            kdf: KdfParams::from_settings(&settings.kdf),
            public_custom_data: None,
            meta: Meta::default(),
            root: Group::new(ROOT_GROUP),
            binaries: Vec::new(),
            trailer: Vec::new(),
            lock: None,
        }
    }

    /// Switches to the cipher, compression and KDF of `settings` for the
    /// next [`Database::encode`]. The contents are left as they are.
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.cipher = settings.cipher;
        self.compressed = settings.compress;
        self.kdf = KdfParams::from_settings(&settings.kdf);
    }

    pub fn cipher(&self) -> Cipher {
        self.cipher
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn decode(data: &[u8], key: &CompositeKey) -> Result<Database> {
        let (header, header_len) = OuterHeader::parse(data)?;
        let (header_bytes, rest) = data.split_at(header_len);

        if rest.len() < 64 {
            return Err(corrupt("truncated header"));
        }
        let (hash, rest) = rest.split_at(32);
        let (tag, rest) = rest.split_at(32);

        if crypto::sha256(&[header_bytes])[..] != hash[..] {
            return Err(corrupt("header checksum mismatch"));
        }

        let transformed = crypto::transform_key(key.raw(), &header.kdf)?;
        let keys = PayloadKeys::derive(&header.master_seed, &transformed);
        if !keys.verify_header(header_bytes, tag) {
            return Err(KpassError::DecryptFailed);
        }

        let ciphertext = crypto::read_blocks(&keys, rest)?;
        let payload = crypto::decrypt_payload(header.cipher, &keys.cipher_key, &header.iv, &ciphertext)?;
        let plain = if header.compressed {
            gunzip(&payload)?
        } else {
            payload
        };

        let (inner, inner_len) = InnerHeader::parse(&plain)?;
        let doc = xml::read_document(&plain[inner_len..])?;

        Ok(Database {
            cipher: header.cipher,
            compressed: header.compressed,
            kdf: header.kdf,
            public_custom_data: header.public_custom_data,
            meta: doc.meta,
            root: doc.root,
            binaries: inner.binaries,
            trailer: doc.trailer,
            lock: Some(Lock {
                stream_id: inner.stream_id,
                key: inner.stream_key,
                len: doc.protected_len,
            }),
        })
    }

    /// Decrypts every protected value in one pass over the tree.
    pub fn unlock(&mut self) -> Result<()> {
        let lock = match self.lock.take() {
            Some(lock) => lock,
            None => return Ok(()),
        };

        let keystream = InnerStream::new(lock.stream_id, &lock.key)?.keystream(lock.len);

        let mut decrypt = |p: &mut Protected| -> Result<()> {
            if let Some(offset) = p.offset.take() {
                let pad = keystream
                    .get(offset..offset + p.bytes.len())
                    .ok_or_else(|| corrupt("protected value outside the inner stream"))?;
                p.bytes.iter_mut().zip(pad).for_each(|(b, k)| *b ^= k);
            }

            Ok(())
        };

        for node in self.meta.extra.iter_mut().chain(self.trailer.iter_mut()) {
            node.try_for_each_protected_mut(&mut decrypt)?;
        }
        self.root.try_for_each_protected_mut(&mut decrypt)
    }

    /// Encodes the database. Seeds, IV, KDF salt and inner stream key are
    /// all regenerated.
    pub fn encode(&mut self, key: &CompositeKey) -> Result<Vec<u8>> {
        self.unlock()?;

        let mut header = OuterHeader::new(self.cipher, self.compressed, self.kdf.reseeded());
        header.public_custom_data = self.public_custom_data.clone();
        let header_bytes = header.to_bytes();

        let transformed = crypto::transform_key(key.raw(), &header.kdf)?;
        let keys = PayloadKeys::derive(&header.master_seed, &transformed);

        let mut inner = InnerHeader::new();
        inner.binaries = self.binaries.clone();
        let mut stream = InnerStream::new(inner.stream_id, &inner.stream_key)?;
        let xml = xml::write_document(&self.meta, &self.root, &self.trailer, &mut stream)?;

        let mut plain = inner.to_bytes();
        plain.extend_from_slice(&xml);
        let payload = if self.compressed { gzip(&plain)? } else { plain };
        let ciphertext = crypto::encrypt_payload(self.cipher, &keys.cipher_key, &header.iv, &payload)?;

        let mut out = header_bytes.clone();
        out.extend_from_slice(&crypto::sha256(&[&header_bytes]));
        out.extend_from_slice(&keys.header_hmac(&header_bytes));
        out.extend_from_slice(&crypto::write_blocks(&keys, &ciphertext));
        self.kdf = header.kdf;

        Ok(out)
    }
}

fn new_uuid() -> [u8; 16] {
    let mut uuid = [0u8; 16];
    uuid.copy_from_slice(&crypto::random_bytes(16));
    uuid
}

fn gzip(data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data)?;

    Ok(Zeroizing::new(enc.finish()?))
}

fn gunzip(data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let mut out = Zeroizing::new(Vec::new());
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| corrupt(format!("bad gzip payload: {}", e)))?;

    Ok(out)
}

/// Opens the database at `path`. A missing file is created with `settings`
/// when `create` is set, and is otherwise an error.
pub fn open<P>(path: P, key: &CompositeKey, settings: &Settings, create: bool) -> Result<Database>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if !create {
                return Err(KpassError::StoreNotFound(path.to_path_buf()));
            }

            debug!("creating new store at {}", path.display());
            let mut db = Database::new(settings);
            seal_and_write(&mut db, path, key)?;
            return Ok(db);
        }
        Err(e) => return Err(e.into()),
    };

    debug!("opening store at {}", path.display());
    Database::decode(&data, key)
}

/// Encodes `db` under `key` and atomically replaces the file at `path`.
pub fn seal_and_write<P>(db: &mut Database, path: P, key: &CompositeKey) -> Result<()>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let data = db.encode(key)?;

    debug!("writing {} bytes to {}", data.len(), path.display());
    write_atomic(path, &data)
}

/// Writes `data` to a sibling temporary file, syncs it and renames it over
/// `path`. The temporary file is unlinked if any step fails.
pub fn write_atomic<P>(path: P, data: &[u8]) -> Result<()>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(KpassError::WriteFailed)?;
    tmp.write_all(data).map_err(KpassError::WriteFailed)?;
    tmp.as_file().sync_all().map_err(KpassError::WriteFailed)?;
    tmp.persist(path).map_err(|e| KpassError::WriteFailed(e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Settings {
        Settings {
            cipher: Cipher::ChaCha20,
            compress: true,
            kdf: KdfSettings::Aes { rounds: 10 },
        }
    }

    fn sample() -> Database {
        let mut db = Database::new(&cheap());
        let group = db.root.ensure(&["a".to_owned(), "b".to_owned()]);
        let mut entry = Entry::new(Utc::now());
        entry.set(TITLE_FIELD, Value::Plain("c".to_owned()));
        entry.set(PASSWORD_FIELD, Value::protected("hunter2"));
        entry.set(NOTES_FIELD, Value::protected("line one\nline two"));
        group.entries.push(entry);
        db
    }

    #[test]
    fn encode_then_decode() {
        let key = CompositeKey::from_password("pw").unwrap();
        let mut db = sample();
        let data = db.encode(&key).unwrap();

        let mut decoded = Database::decode(&data, &key).unwrap();
        assert!(decoded.is_locked());
        assert_eq!(decoded.cipher(), Cipher::ChaCha20);

        let entries = decoded.root.entries_titled(&["a".to_owned(), "b".to_owned()], "c");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].get(PASSWORD_FIELD), None);

        decoded.unlock().unwrap();
        let entries = decoded.root.entries_titled(&["a".to_owned(), "b".to_owned()], "c");
        assert_eq!(entries[0].get(PASSWORD_FIELD), Some("hunter2"));
        assert_eq!(entries[0].get(NOTES_FIELD), Some("line one\nline two"));
    }

    #[test]
    fn wrong_key_is_decrypt_failure() {
        let data = sample().encode(&CompositeKey::from_password("pw").unwrap()).unwrap();

        assert!(matches!(
            Database::decode(&data, &CompositeKey::from_password("nope").unwrap()),
            Err(KpassError::DecryptFailed)
        ));
    }

    #[test]
    fn damage_is_corruption() {
        let key = CompositeKey::from_password("pw").unwrap();
        let data = sample().encode(&key).unwrap();

        let mut flipped = data.clone();
        let last = flipped.len() - 50;
        flipped[last] ^= 0xFF;
        assert!(matches!(
            Database::decode(&flipped, &key),
            Err(KpassError::CorruptDatabase(_))
        ));

        assert!(matches!(
            Database::decode(&data[..data.len() / 2], &key),
            Err(KpassError::CorruptDatabase(_))
        ));
    }

    #[test]
    fn resealing_regenerates_salts() {
        let key = CompositeKey::from_password("pw").unwrap();
        let mut db = sample();
        let first = db.encode(&key).unwrap();
        let first_kdf = db.kdf().clone();
        let second = db.encode(&key).unwrap();

        assert_ne!(first, second);
        assert_ne!(&first_kdf, db.kdf());
    }

    #[test]
    fn prune_and_walk() {
        let mut db = sample();
        db.root.ensure(&["x".to_owned()]);

        let walked = db.root.walk();
        assert_eq!(walked.len(), 1);
        assert_eq!(walked[0].0, vec!["a".to_owned(), "b".to_owned()]);

        let removed = db.root.remove_entries(&["a".to_owned(), "b".to_owned()], "c");
        assert_eq!(removed.len(), 1);
        assert!(db.root.groups_at(&["a".to_owned()]).is_empty());
        // untouched branches are left alone
        assert_eq!(db.root.groups_at(&["x".to_owned()]).len(), 1);
    }

    fn titled(title: &str) -> Entry {
        let mut entry = Entry::new(Utc::now());
        entry.set(TITLE_FIELD, Value::Plain(title.to_owned()));
        entry
    }

    #[test]
    fn same_named_siblings_are_all_searched() {
        let mut root = Group::new(ROOT_GROUP);
        for title in &["b", "c"] {
            let mut group = Group::new("a");
            group.entries.push(titled(title));
            root.groups.push(group);
        }
        let a = ["a".to_owned()];

        assert_eq!(root.groups_at(&a).len(), 2);
        assert_eq!(root.entries_titled(&a, "c").len(), 1);

        assert_eq!(root.remove_entries(&a, "c").len(), 1);
        assert_eq!(root.groups.len(), 1);
        assert_eq!(root.entries_titled(&a, "b").len(), 1);
    }

    #[test]
    fn attachments_and_extras_survive_resealing() {
        let key = CompositeKey::from_password("pw").unwrap();
        let mut db = sample();
        db.binaries.push(Binary {
            flags: 1,
            data: Zeroizing::new(b"file contents".to_vec()),
        });
        db.root.extra = xml::parse(b"<Notes>kept</Notes>").unwrap().children;
        let data = db.encode(&key).unwrap();

        let mut decoded = Database::decode(&data, &key).unwrap();
        decoded.root.ensure(&["z".to_owned()]).entries.push(titled("y"));
        let data = decoded.encode(&key).unwrap();

        let again = Database::decode(&data, &key).unwrap();
        assert_eq!(again.binaries.len(), 1);
        assert_eq!(again.binaries[0].flags, 1);
        assert_eq!(&again.binaries[0].data[..], b"file contents");
        let notes = again.root.extra.iter().filter(|n| n.name == "Notes").collect::<Vec<_>>();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, "kept");
    }

    #[test]
    fn apply_settings_switches_cipher_only() {
        let key = CompositeKey::from_password("pw").unwrap();
        let mut db = sample();
        let uuid = db.root.uuid;
        db.apply_settings(&Settings {
            cipher: Cipher::Aes256,
            compress: false,
            kdf: KdfSettings::Aes { rounds: 5 },
        });

        let decoded = Database::decode(&db.encode(&key).unwrap(), &key).unwrap();
        assert_eq!(decoded.cipher(), Cipher::Aes256);
        assert_eq!(decoded.root.uuid, uuid);
    }

    #[test]
    fn atomic_write_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.kdbx");

        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let missing = dir.path().join("nope").join("db.kdbx");
        assert!(matches!(
            write_atomic(&missing, b"x"),
            Err(KpassError::WriteFailed(_))
        ));
    }

    #[test]
    fn open_creates_only_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.kdbx");
        let key = CompositeKey::from_password("pw").unwrap();

        assert!(matches!(
            open(&path, &key, &cheap(), false),
            Err(KpassError::StoreNotFound(_))
        ));
        open(&path, &key, &cheap(), true).unwrap();
        assert!(path.exists());

        let db = open(&path, &key, &cheap(), false).unwrap();
        assert_eq!(db.root.name, ROOT_GROUP);
        assert!(db.root.is_empty());
    }
}
