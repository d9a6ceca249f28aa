//! Password-protected workbooks (ECMA-376 agile encryption).
//!
//! An encrypted `.xlsx` is a compound file holding an `EncryptionInfo` stream
//! (version 4.4 followed by an XML descriptor) and an `EncryptedPackage` stream
//! (plaintext length, then AES-CBC segments of 4096 bytes). The password key is
//! checked against the verifier before the package is touched.

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use thiserror::Error;

const CFB_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ENCRYPTION_INFO: &str = "EncryptionInfo";
const ENCRYPTED_PACKAGE: &str = "EncryptedPackage";
const SEGMENT_LEN: usize = 4096;
const AES_BLOCK: usize = 16;
const MAX_SPIN_COUNT: u32 = 10_000_000;

const BLOCK_VERIFIER_INPUT: [u8; 8] = [0xfe, 0xa7, 0xd2, 0x76, 0x3b, 0x4b, 0x9e, 0x79];
const BLOCK_VERIFIER_HASH: [u8; 8] = [0xd7, 0xaa, 0x0f, 0x6d, 0x30, 0x61, 0x34, 0x4e];
const BLOCK_KEY_VALUE: [u8; 8] = [0x14, 0x6e, 0x0b, 0xe7, 0xab, 0xac, 0xd0, 0xd6];

#[derive(Error, Debug)]
pub enum DecryptError {
    #[error("file is not an encrypted workbook")]
    NotEncrypted,

    #[error("incorrect password")]
    WrongPassword,

    #[error("unsupported encryption: {0}")]
    Unsupported(String),

    #[error("malformed encrypted workbook: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// `decrypt(fileBytes, password) -> plaintext | WrongPassword`.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, bytes: &[u8], password: &str) -> Result<Vec<u8>, DecryptError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AgileDecryptor;

impl Decryptor for AgileDecryptor {
    fn decrypt(&self, bytes: &[u8], password: &str) -> Result<Vec<u8>, DecryptError> {
        if !is_encrypted(bytes) { return Err(DecryptError::NotEncrypted); }
        let mut file = cfb::CompoundFile::open(Cursor::new(bytes))?;
        let mut info = Vec::new();
        file.open_stream(ENCRYPTION_INFO)?.read_to_end(&mut info)?;
        let mut package = Vec::new();
        file.open_stream(ENCRYPTED_PACKAGE)?.read_to_end(&mut package)?;

        let descriptor = Descriptor::from_info_stream(&info)?;
        let secret = descriptor.unlock(password)?;
        descriptor.decrypt_package(&secret, &package)
    }
}

/// True for compound files carrying the agile-encryption streams.
pub fn is_encrypted(bytes: &[u8]) -> bool {
    if !bytes.starts_with(&CFB_MAGIC) { return false; }
    match cfb::CompoundFile::open(Cursor::new(bytes)) {
        Ok(file) => file.exists(ENCRYPTION_INFO) && file.exists(ENCRYPTED_PACKAGE),
        Err(_) => false,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    fn parse(name: &str) -> Result<Self, DecryptError> {
        match name.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            other => Err(DecryptError::Unsupported(format!("hash algorithm {other}"))),
        }
    }

    fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts { hasher.update(part); }
            hasher.finalize().to_vec()
        }
        match self {
            Self::Sha256 => run::<Sha256>(parts),
            Self::Sha384 => run::<Sha384>(parts),
            Self::Sha512 => run::<Sha512>(parts),
        }
    }
}

/// `keyData` element: parameters of the package cipher.
#[derive(Debug)]
struct KeyData {
    salt: Vec<u8>,
    block_size: usize,
    key_bits: usize,
    hash: HashAlgorithm,
}

/// Password `encryptedKey` element.
#[derive(Debug)]
struct PasswordKey {
    salt: Vec<u8>,
    spin_count: u32,
    block_size: usize,
    key_bits: usize,
    hash: HashAlgorithm,
    verifier_input: Vec<u8>,
    verifier_hash: Vec<u8>,
    key_value: Vec<u8>,
}

#[derive(Debug)]
struct Descriptor {
    key_data: KeyData,
    password_key: PasswordKey,
}

impl Descriptor {
    fn from_info_stream(info: &[u8]) -> Result<Self, DecryptError> {
        if info.len() < 8 { return Err(DecryptError::Malformed("EncryptionInfo too short".into())); }
        let major = u16::from_le_bytes([info[0], info[1]]);
        let minor = u16::from_le_bytes([info[2], info[3]]);
        if (major, minor) != (4, 4) {
            return Err(DecryptError::Unsupported(format!("encryption version {major}.{minor}")));
        }
        let xml = std::str::from_utf8(&info[8..]).map_err(|e| DecryptError::Malformed(e.to_string()))?;
        Self::from_xml(xml.trim_start_matches('\u{feff}'))
    }

    fn from_xml(xml: &str) -> Result<Self, DecryptError> {
        let mut reader = Reader::from_str(xml);
        let mut key_data = None;
        let mut password_key = None;
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"keyData" if key_data.is_none() => key_data = Some(KeyData::from_attrs(&attributes(&e)?)?),
                    b"encryptedKey" if password_key.is_none() => {
                        let attrs = attributes(&e)?;
                        // Certificate key encryptors carry no spin count.
                        if attrs.contains_key("spinCount") { password_key = Some(PasswordKey::from_attrs(&attrs)?); }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(DecryptError::Malformed(e.to_string())),
                _ => {}
            }
        }
        match (key_data, password_key) {
            (Some(key_data), Some(password_key)) => Ok(Self { key_data, password_key }),
            _ => Err(DecryptError::Malformed("missing keyData or password key encryptor".into())),
        }
    }

    /// Verifies the password and returns the package secret key.
    fn unlock(&self, password: &str) -> Result<Vec<u8>, DecryptError> {
        let pk = &self.password_key;
        let base = pk.password_hash(password);
        let iv = fit(pk.salt.clone(), pk.block_size, 0x36);

        let verifier = aes_cbc_decrypt(&pk.block_key(&base, &BLOCK_VERIFIER_INPUT), &iv, &pk.verifier_input)?;
        let verifier = &verifier[..pk.salt.len().min(verifier.len())];
        let expected = pk.hash.digest(&[verifier]);
        let actual = aes_cbc_decrypt(&pk.block_key(&base, &BLOCK_VERIFIER_HASH), &iv, &pk.verifier_hash)?;
        if actual.len() < expected.len() || actual[..expected.len()] != expected[..] {
            return Err(DecryptError::WrongPassword);
        }

        let mut secret = aes_cbc_decrypt(&pk.block_key(&base, &BLOCK_KEY_VALUE), &iv, &pk.key_value)?;
        secret.truncate(self.key_data.key_bits / 8);
        Ok(secret)
    }

    fn decrypt_package(&self, secret: &[u8], package: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if package.len() < 8 { return Err(DecryptError::Malformed("EncryptedPackage too short".into())); }
        let mut size = [0u8; 8];
        size.copy_from_slice(&package[..8]);
        let size = usize::try_from(u64::from_le_bytes(size)).map_err(|_| DecryptError::Malformed("package size overflow".into()))?;

        let kd = &self.key_data;
        let mut plain = Vec::with_capacity(package.len());
        for (index, segment) in package[8..].chunks(SEGMENT_LEN).enumerate() {
            let iv = fit(kd.hash.digest(&[&kd.salt[..], &(index as u32).to_le_bytes()[..]]), kd.block_size, 0x36);
            let aligned = segment.len() - segment.len() % kd.block_size;
            plain.extend(aes_cbc_decrypt(secret, &iv, &segment[..aligned])?);
        }
        if plain.len() < size {
            return Err(DecryptError::Malformed(format!("package holds {} bytes, header says {size}", plain.len())));
        }
        plain.truncate(size);
        Ok(plain)
    }
}

impl KeyData {
    fn from_attrs(attrs: &HashMap<String, String>) -> Result<Self, DecryptError> {
        Ok(Self {
            salt: base64_attr(attrs, "saltValue")?,
            block_size: block_size_attr(attrs)?,
            key_bits: key_bits_attr(attrs)?,
            hash: HashAlgorithm::parse(text_attr(attrs, "hashAlgorithm")?)?,
        })
    }
}

impl PasswordKey {
    fn from_attrs(attrs: &HashMap<String, String>) -> Result<Self, DecryptError> {
        Ok(Self {
            salt: base64_attr(attrs, "saltValue")?,
            spin_count: spin_count_attr(attrs)?,
            block_size: block_size_attr(attrs)?,
            key_bits: key_bits_attr(attrs)?,
            hash: HashAlgorithm::parse(text_attr(attrs, "hashAlgorithm")?)?,
            verifier_input: base64_attr(attrs, "encryptedVerifierHashInput")?,
            verifier_hash: base64_attr(attrs, "encryptedVerifierHashValue")?,
            key_value: base64_attr(attrs, "encryptedKeyValue")?,
        })
    }

    /// H(salt + UTF-16LE password), then `spin_count` rounds of H(i + H).
    fn password_hash(&self, password: &str) -> Vec<u8> {
        let utf16: Vec<u8> = password.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let mut hash = self.hash.digest(&[&self.salt[..], &utf16[..]]);
        for i in 0..self.spin_count {
            hash = self.hash.digest(&[&i.to_le_bytes()[..], &hash[..]]);
        }
        hash
    }

    fn block_key(&self, base: &[u8], block: &[u8]) -> Vec<u8> {
        fit(self.hash.digest(&[base, block]), self.key_bits / 8, 0x36)
    }
}

/// Truncates or pads with `pad` to exactly `len` bytes.
fn fit(mut bytes: Vec<u8>, len: usize, pad: u8) -> Vec<u8> {
    bytes.resize(len, pad);
    bytes
}

fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, DecryptError> {
    if data.len() % 16 != 0 {
        return Err(DecryptError::Malformed("ciphertext is not block aligned".into()));
    }
    let mut buf = data.to_vec();
    let bad_key = |_| DecryptError::Malformed("invalid key or iv length".into());
    let result = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv).map_err(bad_key)?.decrypt_padded_mut::<NoPadding>(&mut buf).map(|_| ()),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv).map_err(bad_key)?.decrypt_padded_mut::<NoPadding>(&mut buf).map(|_| ()),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv).map_err(bad_key)?.decrypt_padded_mut::<NoPadding>(&mut buf).map(|_| ()),
        n => return Err(DecryptError::Unsupported(format!("{}-bit key", n * 8))),
    };
    result.map_err(|_| DecryptError::Malformed("cipher block error".into()))?;
    Ok(buf)
}

fn attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>, DecryptError> {
    let mut map = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| DecryptError::Malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        map.insert(key, String::from_utf8_lossy(&attr.value).into_owned());
    }
    Ok(map)
}

fn text_attr<'a>(attrs: &'a HashMap<String, String>, name: &str) -> Result<&'a str, DecryptError> {
    attrs.get(name).map(String::as_str).ok_or_else(|| DecryptError::Malformed(format!("missing attribute {name}")))
}

fn number_attr<T: std::str::FromStr>(attrs: &HashMap<String, String>, name: &str) -> Result<T, DecryptError> {
    text_attr(attrs, name)?.trim().parse().map_err(|_| DecryptError::Malformed(format!("attribute {name} is not a number")))
}

/// AES only: 16-byte blocks.
fn block_size_attr(attrs: &HashMap<String, String>) -> Result<usize, DecryptError> {
    match number_attr::<usize>(attrs, "blockSize")? {
        AES_BLOCK => Ok(AES_BLOCK),
        n => Err(DecryptError::Unsupported(format!("block size {n}"))),
    }
}

fn key_bits_attr(attrs: &HashMap<String, String>) -> Result<usize, DecryptError> {
    match number_attr::<usize>(attrs, "keyBits")? {
        bits @ (128 | 192 | 256) => Ok(bits),
        n => Err(DecryptError::Unsupported(format!("{n}-bit key"))),
    }
}

fn spin_count_attr(attrs: &HashMap<String, String>) -> Result<u32, DecryptError> {
    let spin: u32 = number_attr(attrs, "spinCount")?;
    if spin > MAX_SPIN_COUNT {
        return Err(DecryptError::Unsupported(format!("spin count {spin}")));
    }
    Ok(spin)
}

fn base64_attr(attrs: &HashMap<String, String>, name: &str) -> Result<Vec<u8>, DecryptError> {
    BASE64.decode(text_attr(attrs, name)?.trim()).map_err(|e| DecryptError::Malformed(format!("attribute {name}: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cbc::cipher::BlockEncryptMut;
    use std::io::Write;

    fn aes256_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
        let mut buf = data.to_vec();
        buf.resize(data.len().div_ceil(16) * 16, 0);
        let len = buf.len();
        cbc::Encryptor::<Aes256>::new_from_slices(key, iv).unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut buf, len).unwrap();
        buf
    }

    /// Builds an agile-encrypted compound file around `plain`.
    pub(crate) fn encrypt_workbook(plain: &[u8], password: &str, spin_count: u32) -> Vec<u8> {
        encrypt_with_key_data(plain, password, spin_count, r#"blockSize="16" keyBits="256""#)
    }

    fn encrypt_with_key_data(plain: &[u8], password: &str, spin_count: u32, key_data_params: &str) -> Vec<u8> {
        let hash = HashAlgorithm::Sha512;
        let key_salt: Vec<u8> = (0u8..16).collect();
        let pw_salt: Vec<u8> = (100u8..116).collect();
        let secret: Vec<u8> = (200u8..232).collect();
        let verifier: Vec<u8> = (50u8..66).collect();

        let pk = PasswordKey {
            salt: pw_salt.clone(), spin_count, block_size: 16, key_bits: 256, hash,
            verifier_input: vec![], verifier_hash: vec![], key_value: vec![],
        };
        let base = pk.password_hash(password);
        let enc_input = aes256_cbc_encrypt(&pk.block_key(&base, &BLOCK_VERIFIER_INPUT), &pw_salt, &verifier);
        let enc_hash = aes256_cbc_encrypt(&pk.block_key(&base, &BLOCK_VERIFIER_HASH), &pw_salt, &hash.digest(&[&verifier[..]]));
        let enc_key = aes256_cbc_encrypt(&pk.block_key(&base, &BLOCK_KEY_VALUE), &pw_salt, &secret);

        let mut package = (plain.len() as u64).to_le_bytes().to_vec();
        for (i, segment) in plain.chunks(SEGMENT_LEN).enumerate() {
            let iv = fit(hash.digest(&[&key_salt[..], &(i as u32).to_le_bytes()[..]]), 16, 0x36);
            package.extend(aes256_cbc_encrypt(&secret, &iv, segment));
        }

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption" xmlns:p="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
<keyData saltSize="16" {} hashSize="64" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="SHA512" saltValue="{}"/>
<keyEncryptors><keyEncryptor uri="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
<p:encryptedKey spinCount="{}" saltSize="16" blockSize="16" keyBits="256" hashSize="64" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="SHA512" saltValue="{}" encryptedVerifierHashInput="{}" encryptedVerifierHashValue="{}" encryptedKeyValue="{}"/>
</keyEncryptor></keyEncryptors></encryption>"#,
            key_data_params, BASE64.encode(&key_salt), spin_count, BASE64.encode(&pw_salt),
            BASE64.encode(&enc_input), BASE64.encode(&enc_hash), BASE64.encode(&enc_key),
        );
        let mut info = vec![4, 0, 4, 0, 0x40, 0, 0, 0];
        info.extend_from_slice(xml.as_bytes());

        let mut file = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
        file.create_stream(ENCRYPTION_INFO).unwrap().write_all(&info).unwrap();
        file.create_stream(ENCRYPTED_PACKAGE).unwrap().write_all(&package).unwrap();
        file.flush().unwrap();
        file.into_inner().into_inner()
    }

    #[test]
    fn test_round_trip_with_correct_password() {
        let plain: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let encrypted = encrypt_workbook(&plain, "비밀1234", 10);
        assert!(is_encrypted(&encrypted));
        assert_eq!(AgileDecryptor.decrypt(&encrypted, "비밀1234").unwrap(), plain);
    }

    #[test]
    fn test_wrong_password_rejected() {
        let encrypted = encrypt_workbook(b"PK\x03\x04 workbook", "right", 5);
        assert!(matches!(AgileDecryptor.decrypt(&encrypted, "wrong"), Err(DecryptError::WrongPassword)));
    }

    #[test]
    fn test_plain_files_not_encrypted() {
        assert!(!is_encrypted(b"PK\x03\x04 plain zip"));
        assert!(matches!(AgileDecryptor.decrypt(b"a,b,c", "x"), Err(DecryptError::NotEncrypted)));
    }

    #[test]
    fn test_fit_pads_and_truncates() {
        assert_eq!(fit(vec![1, 2], 4, 0x36), vec![1, 2, 0x36, 0x36]);
        assert_eq!(fit(vec![1, 2, 3], 2, 0x36), vec![1, 2]);
    }

    #[test]
    fn test_bad_key_data_block_size_is_an_error() {
        let plain: Vec<u8> = (0..5000u32).map(|i| (i % 7) as u8).collect();
        for params in [r#"blockSize="0" keyBits="256""#, r#"blockSize="8" keyBits="256""#, r#"blockSize="16" keyBits="100""#] {
            let encrypted = encrypt_with_key_data(&plain, "pw", 10, params);
            assert!(
                matches!(AgileDecryptor.decrypt(&encrypted, "pw"), Err(DecryptError::Unsupported(_))),
                "{params}"
            );
        }
    }

    #[test]
    fn test_spin_count_is_capped() {
        let mut attrs = HashMap::new();
        attrs.insert("spinCount".to_string(), (MAX_SPIN_COUNT + 1).to_string());
        assert!(matches!(spin_count_attr(&attrs), Err(DecryptError::Unsupported(_))));
        attrs.insert("spinCount".to_string(), "100000".to_string());
        assert_eq!(spin_count_attr(&attrs).unwrap(), 100_000);
    }

    #[test]
    fn test_legacy_version_unsupported() {
        let info = [3u8, 0, 2, 0, 0, 0, 0, 0];
        assert!(matches!(Descriptor::from_info_stream(&info), Err(DecryptError::Unsupported(_))));
    }
}
