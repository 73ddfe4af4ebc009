//! KDBX 4 outer and inner headers, plus the VariantDictionary encoding the
//! KDF parameters are stored in.

use zeroize::Zeroizing;

use super::crypto::{random_bytes, STREAM_CHACHA20};
use super::{corrupt, Cipher, KdfSettings};
use crate::Result;

pub const SIGNATURE_1: u32 = 0x9AA2_D903;
pub const SIGNATURE_2: u32 = 0xB54B_FB67;
pub const VERSION_4: u32 = 0x0004_0000;
const VERSION_MAJOR_MASK: u32 = 0xFFFF_0000;

pub const CIPHER_AES256: [u8; 16] = [
    0x31, 0xc1, 0xf2, 0xe6, 0xbf, 0x71, 0x43, 0x50, 0xbe, 0x58, 0x05, 0x21, 0x6a, 0xfc, 0x5a, 0xff,
];
pub const CIPHER_CHACHA20: [u8; 16] = [
    0xd6, 0x03, 0x8a, 0x2b, 0x8b, 0x6f, 0x4c, 0xb5, 0xa5, 0x24, 0x33, 0x9a, 0x31, 0xdb, 0xb5, 0x9a,
];
pub const KDF_AES: [u8; 16] = [
    0xc9, 0xd9, 0xf3, 0x9a, 0x62, 0x8a, 0x44, 0x60, 0xbf, 0x74, 0x0d, 0x08, 0xc1, 0x8a, 0x4f, 0xea,
];
pub const KDF_ARGON2D: [u8; 16] = [
    0xef, 0x63, 0x6d, 0xdf, 0x8c, 0x29, 0x44, 0x4b, 0x91, 0xf7, 0xa9, 0xa4, 0x03, 0xe3, 0x0a, 0x0c,
];
pub const KDF_ARGON2ID: [u8; 16] = [
    0x9e, 0x29, 0x8b, 0x19, 0x56, 0xdb, 0x47, 0x73, 0xb2, 0x3d, 0xfc, 0x3e, 0xc6, 0xf0, 0xa1, 0xe6,
];

// outer header field ids
const END: u8 = 0;
const COMMENT: u8 = 1;
const CIPHER_ID: u8 = 2;
const COMPRESSION: u8 = 3;
const MASTER_SEED: u8 = 4;
const ENCRYPTION_IV: u8 = 7;
const KDF_PARAMETERS: u8 = 11;
const PUBLIC_CUSTOM_DATA: u8 = 12;

// inner header field ids
const INNER_END: u8 = 0;
const INNER_STREAM_ID: u8 = 1;
const INNER_STREAM_KEY: u8 = 2;
const INNER_BINARY: u8 = 3;

const END_MARKER: &[u8] = b"\r\n\r\n";
const VARIANT_VERSION: u16 = 0x0100;

/// Little-endian cursor over a byte slice; running out of input is a
/// framing error.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> ByteReader<'a> {
        ByteReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| corrupt("unexpected end of header"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;

        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    /// Reads an `i32` length prefix followed by that many bytes.
    fn sized(&mut self) -> Result<&'a [u8]> {
        let len = self.i32()?;
        let len = usize::try_from(len).map_err(|_| corrupt("negative field length"))?;
        self.take(len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variant {
    U32(u32),
    U64(u64),
    Bool(bool),
    I32(i32),
    I64(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Variant {
    fn type_id(&self) -> u8 {
        match self {
            Variant::U32(_) => 0x04,
            Variant::U64(_) => 0x05,
            Variant::Bool(_) => 0x08,
            Variant::I32(_) => 0x0C,
            Variant::I64(_) => 0x0D,
            Variant::Str(_) => 0x18,
            Variant::Bytes(_) => 0x42,
        }
    }

    fn value_bytes(&self) -> Vec<u8> {
        match self {
            Variant::U32(v) => v.to_le_bytes().to_vec(),
            Variant::U64(v) => v.to_le_bytes().to_vec(),
            Variant::Bool(v) => vec![u8::from(*v)],
            Variant::I32(v) => v.to_le_bytes().to_vec(),
            Variant::I64(v) => v.to_le_bytes().to_vec(),
            Variant::Str(v) => v.as_bytes().to_vec(),
            Variant::Bytes(v) => v.clone(),
        }
    }
}

/// Ordered, typed key/value map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantDictionary {
    items: Vec<(String, Variant)>,
}

impl VariantDictionary {
    pub fn parse(data: &[u8]) -> Result<VariantDictionary> {
        let mut r = ByteReader::new(data);
        let version = r.u16()?;
        if version & 0xFF00 != VARIANT_VERSION & 0xFF00 {
            return Err(corrupt(format!("unsupported VariantDictionary version {:#06x}", version)));
        }

        let mut dict = VariantDictionary::default();
        loop {
            let kind = r.u8()?;
            if kind == 0 {
                break;
            }

            let key = String::from_utf8(r.sized()?.to_vec())
                .map_err(|_| corrupt("VariantDictionary key is not UTF-8"))?;
            let raw = r.sized()?;
            let mut v = ByteReader::new(raw);
            let value = match kind {
                0x04 => Variant::U32(v.u32()?),
                0x05 => Variant::U64(v.u64()?),
                0x08 => Variant::Bool(v.u8()? != 0),
                0x0C => Variant::I32(v.i32()?),
                0x0D => Variant::I64(v.i64()?),
                0x18 => Variant::Str(
                    String::from_utf8(raw.to_vec())
                        .map_err(|_| corrupt("VariantDictionary string is not UTF-8"))?,
                ),
                0x42 => Variant::Bytes(raw.to_vec()),
                other => {
                    return Err(corrupt(format!("unknown VariantDictionary type {:#04x}", other)))
                }
            };

            dict.set(key, value);
        }

        Ok(dict)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = VARIANT_VERSION.to_le_bytes().to_vec();

        for (key, value) in &self.items {
            let bytes = value.value_bytes();
            out.push(value.type_id());
            out.extend_from_slice(&(key.len() as i32).to_le_bytes());
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
            out.extend_from_slice(&bytes);
        }
        out.push(0);

        out
    }

    pub fn get(&self, key: &str) -> Option<&Variant> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set<S>(&mut self, key: S, value: Variant)
    where
        S: Into<String>,
    {
        let key = key.into();
        match self.items.iter_mut().find(|(k, _)| *k == key) {
            Some(item) => item.1 = value,
            None => self.items.push((key, value)),
        }
    }

    fn bytes(&self, key: &str) -> Result<Vec<u8>> {
        match self.get(key) {
            Some(Variant::Bytes(b)) => Ok(b.clone()),
            _ => Err(corrupt(format!("KDF parameter {} missing", key))),
        }
    }

    fn u64(&self, key: &str) -> Result<u64> {
        match self.get(key) {
            Some(Variant::U64(v)) => Ok(*v),
            Some(Variant::U32(v)) => Ok(u64::from(*v)),
            _ => Err(corrupt(format!("KDF parameter {} missing", key))),
        }
    }

    fn u32(&self, key: &str) -> Result<u32> {
        match self.get(key) {
            Some(Variant::U32(v)) => Ok(*v),
            _ => Err(corrupt(format!("KDF parameter {} missing", key))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argon2Variant {
    D,
    Id,
}

/// KDF parameters as stored in the outer header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KdfParams {
    Aes {
        rounds: u64,
        seed: Vec<u8>,
    },
    Argon2 {
        variant: Argon2Variant,
        salt: Vec<u8>,
        /// In bytes.
        memory: u64,
        iterations: u64,
        parallelism: u32,
        version: u32,
    },
}

impl KdfParams {
    pub fn from_settings(settings: &KdfSettings) -> KdfParams {
        let argon2 = |variant, memory_kib: u64, iterations, parallelism| KdfParams::Argon2 {
            variant,
            salt: random_bytes(32),
            memory: memory_kib.saturating_mul(1024),
            iterations,
            parallelism,
            version: 0x13,
        };

        match *settings {
            KdfSettings::Aes { rounds } => KdfParams::Aes {
                rounds,
                seed: random_bytes(32),
            },
            KdfSettings::Argon2d {
                memory_kib,
                iterations,
                parallelism,
            } => argon2(Argon2Variant::D, memory_kib, iterations, parallelism),
            KdfSettings::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => argon2(Argon2Variant::Id, memory_kib, iterations, parallelism),
        }
    }

    /// Same kind and cost, fresh seed or salt.
    pub fn reseeded(&self) -> KdfParams {
        let mut params = self.clone();
        match &mut params {
            KdfParams::Aes { seed, .. } => *seed = random_bytes(32),
            KdfParams::Argon2 { salt, .. } => *salt = random_bytes(32),
        }

        params
    }

    pub fn from_dictionary(dict: &VariantDictionary) -> Result<KdfParams> {
        let uuid = dict.bytes("$UUID")?;

        if uuid == KDF_AES {
            return Ok(KdfParams::Aes {
                rounds: dict.u64("R")?,
                seed: dict.bytes("S")?,
            });
        }

        let variant = if uuid == KDF_ARGON2D {
            Argon2Variant::D
        } else if uuid == KDF_ARGON2ID {
            Argon2Variant::Id
        } else {
            return Err(corrupt("unknown KDF"));
        };

        Ok(KdfParams::Argon2 {
            variant,
            salt: dict.bytes("S")?,
            memory: dict.u64("M")?,
            iterations: dict.u64("I")?,
            parallelism: dict.u32("P")?,
            version: dict.u32("V").unwrap_or(0x13),
        })
    }

    pub fn to_dictionary(&self) -> VariantDictionary {
        let mut dict = VariantDictionary::default();

        match self {
            KdfParams::Aes { rounds, seed } => {
                dict.set("$UUID", Variant::Bytes(KDF_AES.to_vec()));
                dict.set("R", Variant::U64(*rounds));
                dict.set("S", Variant::Bytes(seed.clone()));
            }
            KdfParams::Argon2 {
                variant,
                salt,
                memory,
                iterations,
                parallelism,
                version,
            } => {
                let uuid = match variant {
                    Argon2Variant::D => KDF_ARGON2D,
                    Argon2Variant::Id => KDF_ARGON2ID,
                };
                dict.set("$UUID", Variant::Bytes(uuid.to_vec()));
                dict.set("S", Variant::Bytes(salt.clone()));
                dict.set("P", Variant::U32(*parallelism));
                dict.set("M", Variant::U64(*memory));
                dict.set("I", Variant::U64(*iterations));
                dict.set("V", Variant::U32(*version));
            }
        }

        dict
    }
}

/// Everything before the encrypted payload.
#[derive(Debug, Clone)]
pub struct OuterHeader {
    pub cipher: Cipher,
    pub compressed: bool,
    pub master_seed: Vec<u8>,
    pub iv: Vec<u8>,
    pub kdf: KdfParams,
    pub public_custom_data: Option<Vec<u8>>,
}

impl OuterHeader {
    /// Fresh seeds and IV for `cipher`.
    pub fn new(cipher: Cipher, compressed: bool, kdf: KdfParams) -> OuterHeader {
        let iv_len = match cipher {
            Cipher::Aes256 => 16,
            Cipher::ChaCha20 => 12,
        };

        OuterHeader {
            cipher,
            compressed,
            master_seed: random_bytes(32),
            iv: random_bytes(iv_len),
            kdf,
            public_custom_data: None,
        }
    }

    /// Parses the header at the start of `data`, returning it along with
    /// its length in bytes.
    pub fn parse(data: &[u8]) -> Result<(OuterHeader, usize)> {
        let mut r = ByteReader::new(data);

        if r.u32()? != SIGNATURE_1 || r.u32()? != SIGNATURE_2 {
            return Err(corrupt("not a KDBX file"));
        }
        let version = r.u32()?;
        if version & VERSION_MAJOR_MASK != VERSION_4 {
            return Err(corrupt(format!(
                "unsupported KDBX version {}.{}",
                version >> 16,
                version & 0xFFFF
            )));
        }

        let mut cipher = None;
        let mut compressed = false;
        let mut master_seed = None;
        let mut iv = None;
        let mut kdf = None;
        let mut public_custom_data = None;

        loop {
            let id = r.u8()?;
            let len = r.u32()? as usize;
            let value = r.take(len)?;

            match id {
                END => break,
                COMMENT => {}
                CIPHER_ID => {
                    cipher = Some(if value == CIPHER_AES256 {
                        Cipher::Aes256
                    } else if value == CIPHER_CHACHA20 {
                        Cipher::ChaCha20
                    } else {
                        return Err(corrupt("unsupported cipher"));
                    })
                }
                COMPRESSION => {
                    compressed = match ByteReader::new(value).u32()? {
                        0 => false,
                        1 => true,
                        other => return Err(corrupt(format!("unknown compression {}", other))),
                    }
                }
                MASTER_SEED => master_seed = Some(value.to_vec()),
                ENCRYPTION_IV => iv = Some(value.to_vec()),
                KDF_PARAMETERS => {
                    kdf = Some(KdfParams::from_dictionary(&VariantDictionary::parse(value)?)?)
                }
                PUBLIC_CUSTOM_DATA => public_custom_data = Some(value.to_vec()),
                other => log::debug!("skipping outer header field {}", other),
            }
        }

        let master_seed = master_seed.ok_or_else(|| corrupt("header has no master seed"))?;
        if master_seed.len() != 32 {
            return Err(corrupt("master seed must be 32 bytes"));
        }

        let header = OuterHeader {
            cipher: cipher.ok_or_else(|| corrupt("header has no cipher"))?,
            compressed,
            master_seed,
            iv: iv.ok_or_else(|| corrupt("header has no encryption IV"))?,
            kdf: kdf.ok_or_else(|| corrupt("header has no KDF parameters"))?,
            public_custom_data,
        };

        Ok((header, r.position()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(&SIGNATURE_1.to_le_bytes());
        out.extend_from_slice(&SIGNATURE_2.to_le_bytes());
        out.extend_from_slice(&VERSION_4.to_le_bytes());

        let mut field = |id: u8, value: &[u8]| {
            out.push(id);
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(value);
        };

        let cipher = match self.cipher {
            Cipher::Aes256 => CIPHER_AES256,
            Cipher::ChaCha20 => CIPHER_CHACHA20,
        };
        field(CIPHER_ID, &cipher);
        field(COMPRESSION, &u32::from(self.compressed).to_le_bytes());
        field(MASTER_SEED, &self.master_seed);
        field(ENCRYPTION_IV, &self.iv);
        field(KDF_PARAMETERS, &self.kdf.to_dictionary().to_bytes());
        if let Some(data) = &self.public_custom_data {
            field(PUBLIC_CUSTOM_DATA, data);
        }
        field(END, END_MARKER);

        out
    }
}

/// An inner header attachment, kept as it was read: the flags byte (bit 0
/// asks clients to protect it in memory) and the raw contents.
#[derive(Clone)]
pub struct Binary {
    pub flags: u8,
    pub data: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for Binary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binary")
            .field("flags", &self.flags)
            .field("len", &self.data.len())
            .finish()
    }
}

/// The header at the start of the decrypted payload.
pub struct InnerHeader {
    pub stream_id: u32,
    pub stream_key: Zeroizing<Vec<u8>>,
    /// Attachments, in the order entries reference them.
    pub binaries: Vec<Binary>,
}

impl InnerHeader {
    /// A ChaCha20 stream with a fresh key.
    pub fn new() -> InnerHeader {
        InnerHeader {
            stream_id: STREAM_CHACHA20,
            stream_key: Zeroizing::new(random_bytes(64)),
            binaries: Vec::new(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<(InnerHeader, usize)> {
        let mut r = ByteReader::new(data);
        let mut stream_id = None;
        let mut stream_key = None;
        let mut binaries = Vec::new();

        loop {
            let id = r.u8()?;
            let value = r.sized()?;

            match id {
                INNER_END => break,
                INNER_STREAM_ID => stream_id = Some(ByteReader::new(value).u32()?),
                INNER_STREAM_KEY => stream_key = Some(Zeroizing::new(value.to_vec())),
                INNER_BINARY => {
                    let (flags, data) = value
                        .split_first()
                        .ok_or_else(|| corrupt("empty binary attachment"))?;
                    binaries.push(Binary {
                        flags: *flags,
                        data: Zeroizing::new(data.to_vec()),
                    });
                }
                other => return Err(corrupt(format!("unknown inner header field {}", other))),
            }
        }

        let header = InnerHeader {
            stream_id: stream_id.ok_or_else(|| corrupt("inner header has no stream id"))?,
            stream_key: stream_key.ok_or_else(|| corrupt("inner header has no stream key"))?,
            binaries,
        };

        Ok((header, r.position()))
    }

    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(80));

        out.push(INNER_STREAM_ID);
        out.extend_from_slice(&4i32.to_le_bytes());
        out.extend_from_slice(&self.stream_id.to_le_bytes());

        out.push(INNER_STREAM_KEY);
        out.extend_from_slice(&(self.stream_key.len() as i32).to_le_bytes());
        out.extend_from_slice(&self.stream_key);

        for binary in &self.binaries {
            out.push(INNER_BINARY);
            out.extend_from_slice(&(binary.data.len() as i32 + 1).to_le_bytes());
            out.push(binary.flags);
            out.extend_from_slice(&binary.data);
        }

        out.push(INNER_END);
        out.extend_from_slice(&0i32.to_le_bytes());

        out
    }
}
