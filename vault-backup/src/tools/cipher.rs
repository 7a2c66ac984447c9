//! Passphrase-based streaming AES-256-GCM encryption of packed archives.
//!
//! Layout: `MAGIC | salt (16) | nonce prefix (7) | chunk...`. Every chunk
//! seals 64 KiB of plaintext except the last, which is shorter (possibly
//! empty) and sealed with the STREAM "last block" flag, so truncation at a
//! chunk boundary is detected. The key is Argon2id over the passphrase and
//! the per-archive salt.

use super::{Cipher, SealingWrite};
use crate::utils::errors::{ToolError, ToolResult};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::stream::{DecryptorBE32, EncryptorBE32};
use aes_gcm::aead::KeyInit;
use aes_gcm::Aes256Gcm;
use argon2::Argon2;
use rand::RngCore;
use std::io::{self, Read, Write};

const MAGIC: &[u8; 6] = b"VBAK02";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 7;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + NONCE_LEN;
const CHUNK_LEN: usize = 64 * 1024;
const TAG_LEN: usize = 16;

pub struct AesGcmCipher;

impl Cipher for AesGcmCipher {
    fn encrypt_to<'a>(
        &self,
        out: &'a mut dyn Write,
        key: &str,
    ) -> ToolResult<Box<dyn SealingWrite + 'a>> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let aead = new_aead(key, &salt)?;
        out.write_all(MAGIC)?;
        out.write_all(&salt)?;
        out.write_all(&nonce)?;

        Ok(Box::new(SealingWriter {
            out,
            encryptor: Some(EncryptorBE32::from_aead(aead, GenericArray::from_slice(&nonce))),
            buffer: Vec::with_capacity(CHUNK_LEN),
        }))
    }

    fn decrypt_from<'a>(&self, input: &'a mut dyn Read, key: &str) -> ToolResult<Box<dyn Read + 'a>> {
        let mut header = [0u8; HEADER_LEN];
        let read = read_full(input, &mut header)?;
        if read < HEADER_LEN || &header[..MAGIC.len()] != MAGIC {
            return Err(ToolError::Crypto(
                "archive encryption header missing or invalid".to_string(),
            ));
        }

        let salt = &header[MAGIC.len()..MAGIC.len() + SALT_LEN];
        let nonce = &header[MAGIC.len() + SALT_LEN..];
        let aead = new_aead(key, salt)?;

        let mut reader = OpeningReader {
            input,
            decryptor: Some(DecryptorBE32::from_aead(aead, GenericArray::from_slice(nonce))),
            plain: Vec::new(),
            pos: 0,
        };
        // Open the first chunk now so a wrong key is reported here
        reader.fill().map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => ToolError::Crypto(e.to_string()),
            _ => ToolError::Io(e),
        })?;
        Ok(Box::new(reader))
    }
}

/// Buffers plaintext into full chunks and seals each one as it fills.
struct SealingWriter<'a> {
    out: &'a mut dyn Write,
    encryptor: Option<EncryptorBE32<Aes256Gcm>>,
    buffer: Vec<u8>,
}

impl SealingWriter<'_> {
    fn seal_chunk(&mut self) -> io::Result<()> {
        let encryptor = self
            .encryptor
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stream already finished"))?;
        let sealed = encryptor
            .encrypt_next(self.buffer.as_slice())
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "failed to encrypt archive chunk"))?;
        self.out.write_all(&sealed)?;
        self.buffer.clear();
        Ok(())
    }
}

impl Write for SealingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let take = buf.len().min(CHUNK_LEN - self.buffer.len());
        self.buffer.extend_from_slice(&buf[..take]);
        if self.buffer.len() == CHUNK_LEN {
            self.seal_chunk()?;
        }
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl SealingWrite for SealingWriter<'_> {
    fn finish(self: Box<Self>) -> ToolResult<()> {
        let mut this = *self;
        let encryptor = this
            .encryptor
            .take()
            .ok_or_else(|| ToolError::Crypto("stream already finished".to_string()))?;
        let sealed = encryptor
            .encrypt_last(this.buffer.as_slice())
            .map_err(|e| ToolError::Crypto(format!("failed to encrypt archive: {}", e)))?;
        this.out.write_all(&sealed)?;
        this.out.flush()?;
        Ok(())
    }
}

/// Opens one sealed chunk at a time and serves its plaintext.
struct OpeningReader<'a> {
    input: &'a mut dyn Read,
    decryptor: Option<DecryptorBE32<Aes256Gcm>>,
    plain: Vec<u8>,
    pos: usize,
}

impl OpeningReader<'_> {
    /// Open the next chunk. Returns false once the last chunk was consumed.
    fn fill(&mut self) -> io::Result<bool> {
        let Some(mut decryptor) = self.decryptor.take() else {
            return Ok(false);
        };

        let mut sealed = vec![0u8; CHUNK_LEN + TAG_LEN];
        let read = read_full(&mut *self.input, &mut sealed)?;
        sealed.truncate(read);

        // A short chunk is the last one
        let opened = if read == CHUNK_LEN + TAG_LEN {
            let opened = decryptor.decrypt_next(sealed.as_slice());
            self.decryptor = Some(decryptor);
            opened
        } else {
            decryptor.decrypt_last(sealed.as_slice())
        };

        self.plain = opened.map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "decryption failed (wrong key or corrupted archive)",
            )
        })?;
        self.pos = 0;
        Ok(true)
    }
}

impl Read for OpeningReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.plain.len() {
            if !self.fill()? {
                return Ok(0);
            }
        }
        let count = buf.len().min(self.plain.len() - self.pos);
        buf[..count].copy_from_slice(&self.plain[self.pos..self.pos + count]);
        self.pos += count;
        Ok(count)
    }
}

fn new_aead(passphrase: &str, salt: &[u8]) -> ToolResult<Aes256Gcm> {
    let key = derive_key(passphrase, salt)?;
    Aes256Gcm::new_from_slice(&key)
        .map_err(|e| ToolError::Crypto(format!("failed to create cipher: {}", e)))
}

/// Argon2id with the library defaults.
fn derive_key(passphrase: &str, salt: &[u8]) -> ToolResult<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| ToolError::Crypto(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

/// Fill `buf` as far as the input allows; short only at end of input.
fn read_full(input: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
