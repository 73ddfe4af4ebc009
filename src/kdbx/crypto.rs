//! Cryptographic plumbing for KDBX 4: hashing, key derivation, the outer
//! payload ciphers, the HMAC block stream and the inner random stream.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher};
use aes::Aes256;
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20::ChaCha20;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::{digest, hmac};
use salsa20::Salsa20;
use zeroize::{Zeroize, Zeroizing};

use super::header::{Argon2Variant, KdfParams};
use super::{corrupt, Cipher};
use crate::error::KpassError;
use crate::Result;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Payload is split into blocks of at most this many bytes.
const BLOCK_SIZE: usize = 1024 * 1024;
const SALSA20_NONCE: [u8; 8] = [0xE8, 0x30, 0x09, 0x4B, 0x97, 0x20, 0x5D, 0x2A];

pub const STREAM_SALSA20: u32 = 2;
pub const STREAM_CHACHA20: u32 = 3;

pub fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut ctx = digest::Context::new(&digest::SHA256);
    for part in parts {
        ctx.update(part);
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(ctx.finish().as_ref());
    out
}

pub fn sha512(parts: &[&[u8]]) -> [u8; 64] {
    let mut ctx = digest::Context::new(&digest::SHA512);
    for part in parts {
        ctx.update(part);
    }

    let mut out = [0u8; 64];
    out.copy_from_slice(ctx.finish().as_ref());
    out
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Runs the KDF over the composite key.
pub(crate) fn transform_key(composite: &[u8; 32], kdf: &KdfParams) -> Result<Zeroizing<[u8; 32]>> {
    match kdf {
        KdfParams::Aes { rounds, seed } => aes_kdf(composite, seed, *rounds),
        KdfParams::Argon2 {
            variant,
            salt,
            memory,
            iterations,
            parallelism,
            version,
        } => {
            let m_cost = u32::try_from(memory / 1024)
                .map_err(|_| corrupt("Argon2 memory cost out of range"))?;
            let t_cost = u32::try_from(*iterations)
                .map_err(|_| corrupt("Argon2 iteration count out of range"))?;
            let params = Params::new(m_cost, t_cost, *parallelism, Some(32))
                .map_err(|e| corrupt(format!("invalid Argon2 parameters: {}", e)))?;
            let algorithm = match variant {
                Argon2Variant::D => Algorithm::Argon2d,
                Argon2Variant::Id => Algorithm::Argon2id,
            };
            let version = match version {
                0x10 => Version::V0x10,
                _ => Version::V0x13,
            };

            let mut out = Zeroizing::new([0u8; 32]);
            Argon2::new(algorithm, version, params)
                .hash_password_into(composite, salt, &mut out[..])
                .map_err(|e| corrupt(format!("Argon2 failed: {}", e)))?;

            Ok(out)
        }
    }
}

fn aes_kdf(composite: &[u8; 32], seed: &[u8], rounds: u64) -> Result<Zeroizing<[u8; 32]>> {
    let cipher = Aes256::new_from_slice(seed).map_err(|_| corrupt("AES-KDF seed must be 32 bytes"))?;
    let mut left = aes::Block::clone_from_slice(&composite[..16]);
    let mut right = aes::Block::clone_from_slice(&composite[16..]);

    for _ in 0..rounds {
        cipher.encrypt_block(&mut left);
        cipher.encrypt_block(&mut right);
    }

    let mut transformed = Zeroizing::new([0u8; 32]);
    transformed[..16].copy_from_slice(&left);
    transformed[16..].copy_from_slice(&right);
    left.as_mut_slice().zeroize();
    right.as_mut_slice().zeroize();

    Ok(Zeroizing::new(sha256(&[&transformed[..]])))
}

/// The keys the outer payload is protected with.
pub(crate) struct PayloadKeys {
    pub cipher_key: Zeroizing<[u8; 32]>,
    pub hmac_key: Zeroizing<[u8; 64]>,
}

impl PayloadKeys {
    pub fn derive(master_seed: &[u8], transformed: &[u8; 32]) -> PayloadKeys {
        PayloadKeys {
            cipher_key: Zeroizing::new(sha256(&[master_seed, transformed])),
            hmac_key: Zeroizing::new(sha512(&[master_seed, transformed, &[1]])),
        }
    }

    fn block_key(&self, index: u64) -> hmac::Key {
        let key = Zeroizing::new(sha512(&[&index.to_le_bytes(), &self.hmac_key[..]]));
        hmac::Key::new(hmac::HMAC_SHA256, &key[..])
    }

    pub fn header_hmac(&self, header: &[u8]) -> [u8; 32] {
        let tag = hmac::sign(&self.block_key(u64::MAX), header);
        let mut out = [0u8; 32];
        out.copy_from_slice(tag.as_ref());
        out
    }

    pub fn verify_header(&self, header: &[u8], tag: &[u8]) -> bool {
        hmac::verify(&self.block_key(u64::MAX), header, tag).is_ok()
    }
}

pub(crate) fn encrypt_payload(cipher: Cipher, key: &[u8; 32], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    match cipher {
        Cipher::Aes256 => {
            let enc = Aes256CbcEnc::new_from_slices(key, iv)
                .map_err(|_| corrupt("invalid AES-256 IV length"))?;
            Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(data))
        }
        Cipher::ChaCha20 => {
            let mut enc = ChaCha20::new_from_slices(key, iv)
                .map_err(|_| corrupt("invalid ChaCha20 nonce length"))?;
            let mut out = data.to_vec();
            enc.apply_keystream(&mut out);
            Ok(out)
        }
    }
}

pub(crate) fn decrypt_payload(
    cipher: Cipher,
    key: &[u8; 32],
    iv: &[u8],
    data: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    match cipher {
        Cipher::Aes256 => {
            let dec = Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|_| corrupt("invalid AES-256 IV length"))?;
            dec.decrypt_padded_vec_mut::<Pkcs7>(data)
                .map(Zeroizing::new)
                .map_err(|_| corrupt("invalid payload padding"))
        }
        Cipher::ChaCha20 => {
            let mut dec = ChaCha20::new_from_slices(key, iv)
                .map_err(|_| corrupt("invalid ChaCha20 nonce length"))?;
            let mut out = Zeroizing::new(data.to_vec());
            dec.apply_keystream(&mut out);
            Ok(out)
        }
    }
}

fn block_message(index: u64, data: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(12 + data.len());
    message.extend_from_slice(&index.to_le_bytes());
    message.extend_from_slice(&(data.len() as i32).to_le_bytes());
    message.extend_from_slice(data);
    message
}

/// Frames `data` as an HMAC-authenticated block stream.
pub(crate) fn write_blocks(keys: &PayloadKeys, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + (data.len() / BLOCK_SIZE + 2) * 36);
    let mut index = 0u64;

    for chunk in data.chunks(BLOCK_SIZE).chain(std::iter::once(&[][..])) {
        let tag = hmac::sign(&keys.block_key(index), &block_message(index, chunk));

        out.extend_from_slice(tag.as_ref());
        out.extend_from_slice(&(chunk.len() as i32).to_le_bytes());
        out.extend_from_slice(chunk);
        index += 1;
    }

    out
}

/// Verifies and unframes an HMAC block stream.
pub(crate) fn read_blocks(keys: &PayloadKeys, mut data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut index = 0u64;

    loop {
        if data.len() < 36 {
            return Err(corrupt("truncated block stream"));
        }

        let (tag, rest) = data.split_at(32);
        let mut len = [0u8; 4];
        len.copy_from_slice(&rest[..4]);
        let len = i32::from_le_bytes(len);
        let rest = &rest[4..];

        let len = usize::try_from(len).map_err(|_| corrupt("negative block size"))?;
        if rest.len() < len {
            return Err(corrupt("truncated block"));
        }

        let (block, rest) = rest.split_at(len);
        hmac::verify(&keys.block_key(index), &block_message(index, block), tag)
            .map_err(|_| corrupt(format!("block {} failed authentication", index)))?;

        if block.is_empty() {
            break;
        }

        out.extend_from_slice(block);
        data = rest;
        index += 1;
    }

    Ok(out)
}

/// The stream cipher protected values are XORed with.
pub(crate) enum InnerStream {
    Salsa20(Salsa20),
    ChaCha20(ChaCha20),
}

impl InnerStream {
    pub fn new(id: u32, key: &[u8]) -> Result<InnerStream> {
        match id {
            STREAM_SALSA20 => {
                let key = Zeroizing::new(sha256(&[key]));
                let cipher = Salsa20::new_from_slices(&key[..], &SALSA20_NONCE)
                    .map_err(|_| corrupt("invalid Salsa20 key"))?;
                Ok(InnerStream::Salsa20(cipher))
            }
            STREAM_CHACHA20 => {
                let hash = Zeroizing::new(sha512(&[key]));
                let cipher = ChaCha20::new_from_slices(&hash[..32], &hash[32..44])
                    .map_err(|_| corrupt("invalid ChaCha20 key"))?;
                Ok(InnerStream::ChaCha20(cipher))
            }
            other => Err(KpassError::CorruptDatabase(format!(
                "unsupported inner stream {}",
                other
            ))),
        }
    }

    pub fn apply(&mut self, buf: &mut [u8]) {
        match self {
            InnerStream::Salsa20(c) => c.apply_keystream(buf),
            InnerStream::ChaCha20(c) => c.apply_keystream(buf),
        }
    }

    /// The next `len` bytes of keystream.
    pub fn keystream(&mut self, len: usize) -> Zeroizing<Vec<u8>> {
        let mut buf = Zeroizing::new(vec![0u8; len]);
        self.apply(&mut buf);
        buf
    }
}
