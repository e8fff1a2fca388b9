//! MS-OFFCRYPTO password decryption.
//!
//! Password-protected xlsx files are OLE/CFB containers holding an
//! `EncryptionInfo` descriptor and an `EncryptedPackage` stream. Both the
//! Agile (4.4, XML descriptor) and Standard (x.2, AES-ECB) schemes are
//! supported. Anything that is not such a container passes through untouched.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use aes::cipher::{BlockDecrypt, KeyInit, generic_array::GenericArray};
use aes::{Aes128, Aes192, Aes256};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, KeyIvInit};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::XlsxIoError;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const C_STREAM_ENCRYPTION_INFO: &str = "EncryptionInfo";
const C_STREAM_ENCRYPTED_PACKAGE: &str = "EncryptedPackage";

const N_LEN_AES_BLOCK: usize = 16;
const N_LEN_AGILE_SEGMENT: usize = 4096;
const N_SPIN_COUNT_STANDARD: u32 = 50_000;
const N_LEN_SHA1: usize = 20;

const BLOCK_KEY_VERIFIER_INPUT: [u8; 8] = [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79];
const BLOCK_KEY_VERIFIER_VALUE: [u8; 8] = [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E];
const BLOCK_KEY_SECRET: [u8; 8] = [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6];

const CALG_AES_128: u32 = 0x0000_660E;
const CALG_AES_192: u32 = 0x0000_660F;
const CALG_AES_256: u32 = 0x0000_6610;
const CALG_SHA1: u32 = 0x0000_8004;

////////////////////////////////////////////////////////////////////////////////
// #region PublicApi

/// `true` when `bytes` is an OLE container with both encryption streams.
pub fn is_encrypted_package(bytes: &[u8]) -> bool {
    if !bytes.starts_with(&OLE_MAGIC) {
        return false;
    }
    let Ok(ole) = cfb::CompoundFile::open(Cursor::new(bytes)) else {
        return false;
    };
    ole.is_stream(C_STREAM_ENCRYPTION_INFO) && ole.is_stream(C_STREAM_ENCRYPTED_PACKAGE)
}

/// Decrypt a password-protected workbook to its plain OOXML zip bytes.
///
/// Plain zip packages, non-OLE bytes and OLE files without encryption
/// streams (legacy `.xls`) are returned unchanged.
///
/// # Errors
/// - [`XlsxIoError::PasswordRequired`] for an encrypted file without password.
/// - [`XlsxIoError::WrongPassword`] when the verifier check fails.
/// - [`XlsxIoError::CorruptFile`] for a broken container or unsupported scheme.
pub fn decrypt_workbook_bytes(
    bytes: &[u8],
    password: Option<&str>,
) -> Result<Vec<u8>, XlsxIoError> {
    if !bytes.starts_with(&OLE_MAGIC) {
        return Ok(bytes.to_vec());
    }

    let mut ole = cfb::CompoundFile::open(Cursor::new(bytes))
        .map_err(|e| XlsxIoError::CorruptFile(format!("cannot open OLE container: {e}")))?;
    if !(ole.is_stream(C_STREAM_ENCRYPTION_INFO) && ole.is_stream(C_STREAM_ENCRYPTED_PACKAGE)) {
        tracing::debug!("OLE container without encryption streams, passing through");
        return Ok(bytes.to_vec());
    }

    let password = password.ok_or(XlsxIoError::PasswordRequired)?;

    let mut encryption_info = Vec::new();
    ole.open_stream(C_STREAM_ENCRYPTION_INFO)
        .and_then(|mut stream| stream.read_to_end(&mut encryption_info))
        .map_err(|e| XlsxIoError::CorruptFile(format!("cannot read EncryptionInfo: {e}")))?;
    let mut encrypted_package = Vec::new();
    ole.open_stream(C_STREAM_ENCRYPTED_PACKAGE)
        .and_then(|mut stream| stream.read_to_end(&mut encrypted_package))
        .map_err(|e| XlsxIoError::CorruptFile(format!("cannot read EncryptedPackage: {e}")))?;

    let package = match parse_encryption_info(&encryption_info)? {
        EnumEncryptionInfo::Agile(info) => {
            tracing::debug!(spin_count = info.spin_count, "decrypting agile package");
            decrypt_agile_package(&info, &encrypted_package, password)?
        }
        EnumEncryptionInfo::Standard(info) => {
            tracing::debug!(key_bits = info.key_bits, "decrypting standard package");
            decrypt_standard_package(&info, &encrypted_package, password)?
        }
    };

    if !package.starts_with(b"PK") {
        return Err(XlsxIoError::CorruptFile(
            "decrypted package is not a zip archive".to_string(),
        ));
    }
    Ok(package)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region EncryptionInfo

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumHashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl EnumHashAlgorithm {
    fn from_name(name: &str) -> Result<Self, XlsxIoError> {
        match name.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            other => Err(XlsxIoError::CorruptFile(format!(
                "unsupported hash algorithm: {other}"
            ))),
        }
    }

    fn derive_digest(self, parts: &[&[u8]]) -> Vec<u8> {
        fn digest_parts<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }

        match self {
            Self::Sha1 => digest_parts::<Sha1>(parts),
            Self::Sha256 => digest_parts::<Sha256>(parts),
            Self::Sha384 => digest_parts::<Sha384>(parts),
            Self::Sha512 => digest_parts::<Sha512>(parts),
        }
    }

    fn len_output(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

#[derive(Debug, Clone)]
struct SpecAgileInfo {
    key_data_salt: Vec<u8>,
    key_data_hash: EnumHashAlgorithm,
    key_data_block_size: usize,
    key_data_key_bits: usize,

    spin_count: u32,
    password_salt: Vec<u8>,
    password_hash: EnumHashAlgorithm,
    password_block_size: usize,
    password_key_bits: usize,
    encrypted_verifier_hash_input: Vec<u8>,
    encrypted_verifier_hash_value: Vec<u8>,
    encrypted_key_value: Vec<u8>,
}

#[derive(Debug, Clone)]
struct SpecStandardInfo {
    key_bits: usize,
    salt: Vec<u8>,
    encrypted_verifier: Vec<u8>,
    encrypted_verifier_hash: Vec<u8>,
}

#[derive(Debug, Clone)]
enum EnumEncryptionInfo {
    Agile(SpecAgileInfo),
    Standard(SpecStandardInfo),
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n_len: usize, ctx: &str) -> Result<&'a [u8], XlsxIoError> {
        let pos_end = self
            .pos
            .checked_add(n_len)
            .filter(|pos_end| *pos_end <= self.bytes.len())
            .ok_or_else(|| XlsxIoError::CorruptFile(format!("truncated {ctx}")))?;
        let bytes = self.bytes;
        let out = &bytes[self.pos..pos_end];
        self.pos = pos_end;
        Ok(out)
    }

    fn read_u16(&mut self, ctx: &str) -> Result<u16, XlsxIoError> {
        let raw = self.take(2, ctx)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    fn read_u32(&mut self, ctx: &str) -> Result<u32, XlsxIoError> {
        let raw = self.take(4, ctx)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn remaining(&self) -> &'a [u8] {
        let bytes = self.bytes;
        &bytes[self.pos..]
    }
}

fn parse_encryption_info(bytes: &[u8]) -> Result<EnumEncryptionInfo, XlsxIoError> {
    let mut cursor = ByteCursor::new(bytes);
    let n_major = cursor.read_u16("EncryptionInfo version")?;
    let n_minor = cursor.read_u16("EncryptionInfo version")?;
    let _flags = cursor.read_u32("EncryptionInfo flags")?;

    match (n_major, n_minor) {
        (4, 4) => Ok(EnumEncryptionInfo::Agile(parse_agile_info(
            cursor.remaining(),
        )?)),
        (2..=4, 2) => Ok(EnumEncryptionInfo::Standard(parse_standard_info(
            &mut cursor,
        )?)),
        _ => Err(XlsxIoError::CorruptFile(format!(
            "unsupported encryption version {n_major}.{n_minor}"
        ))),
    }
}

fn parse_standard_info(cursor: &mut ByteCursor<'_>) -> Result<SpecStandardInfo, XlsxIoError> {
    let n_len_header = cursor.read_u32("EncryptionHeader size")? as usize;
    let mut header = ByteCursor::new(cursor.take(n_len_header, "EncryptionHeader")?);
    let _flags = header.read_u32("EncryptionHeader")?;
    let _size_extra = header.read_u32("EncryptionHeader")?;
    let alg_id = header.read_u32("EncryptionHeader")?;
    let alg_id_hash = header.read_u32("EncryptionHeader")?;
    let n_key_size = header.read_u32("EncryptionHeader")? as usize;

    let key_bits = match alg_id {
        CALG_AES_128 => 128,
        CALG_AES_192 => 192,
        CALG_AES_256 => 256,
        other => {
            return Err(XlsxIoError::CorruptFile(format!(
                "unsupported standard cipher 0x{other:04X}"
            )));
        }
    };
    if n_key_size != 0 && n_key_size != key_bits {
        return Err(XlsxIoError::CorruptFile(format!(
            "key size {n_key_size} does not match cipher"
        )));
    }
    if alg_id_hash != CALG_SHA1 && alg_id_hash != 0 {
        return Err(XlsxIoError::CorruptFile(format!(
            "unsupported standard hash 0x{alg_id_hash:04X}"
        )));
    }

    let n_len_salt = cursor.read_u32("EncryptionVerifier salt size")? as usize;
    let salt = cursor.take(n_len_salt, "EncryptionVerifier salt")?.to_vec();
    let encrypted_verifier = cursor.take(N_LEN_AES_BLOCK, "EncryptionVerifier")?.to_vec();
    let _n_len_verifier_hash = cursor.read_u32("EncryptionVerifier hash size")?;
    let encrypted_verifier_hash = cursor.take(32, "EncryptionVerifier hash")?.to_vec();

    Ok(SpecStandardInfo {
        key_bits,
        salt,
        encrypted_verifier,
        encrypted_verifier_hash,
    })
}

fn derive_attr_map(elem: &BytesStart<'_>) -> Result<BTreeMap<String, String>, XlsxIoError> {
    let mut dict_attrs = BTreeMap::new();
    for attr in elem.attributes().with_checks(false) {
        let attr =
            attr.map_err(|e| XlsxIoError::CorruptFile(format!("invalid XML attribute: {e}")))?;
        dict_attrs.insert(
            String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
            String::from_utf8_lossy(attr.value.as_ref()).into_owned(),
        );
    }
    Ok(dict_attrs)
}

fn derive_attr<'a>(
    dict_attrs: &'a BTreeMap<String, String>,
    key: &str,
    elem: &str,
) -> Result<&'a str, XlsxIoError> {
    dict_attrs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| XlsxIoError::CorruptFile(format!("missing {elem}.{key}")))
}

fn parse_attr_usize(
    dict_attrs: &BTreeMap<String, String>,
    key: &str,
    elem: &str,
) -> Result<usize, XlsxIoError> {
    derive_attr(dict_attrs, key, elem)?
        .trim()
        .parse::<usize>()
        .map_err(|_| XlsxIoError::CorruptFile(format!("invalid {elem}.{key}")))
}

fn decode_base64_attr(
    dict_attrs: &BTreeMap<String, String>,
    key: &str,
    elem: &str,
) -> Result<Vec<u8>, XlsxIoError> {
    let c_value: String = derive_attr(dict_attrs, key, elem)?
        .chars()
        .filter(|chr| !chr.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(c_value.as_bytes())
        .map_err(|_| XlsxIoError::CorruptFile(format!("invalid base64 in {elem}.{key}")))
}

fn parse_agile_info(xml: &[u8]) -> Result<SpecAgileInfo, XlsxIoError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut dict_key_data: Option<BTreeMap<String, String>> = None;
    let mut dict_password_key: Option<BTreeMap<String, String>> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(elem)) | Ok(Event::Empty(elem)) => {
                match elem.local_name().as_ref() {
                    b"keyData" => dict_key_data = Some(derive_attr_map(&elem)?),
                    b"encryptedKey" => {
                        let dict_attrs = derive_attr_map(&elem)?;
                        // Only the password key encryptor carries a spin count.
                        if dict_attrs.contains_key("spinCount") {
                            dict_password_key = Some(dict_attrs);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(XlsxIoError::CorruptFile(format!(
                    "invalid EncryptionInfo XML: {e}"
                )));
            }
        }
        buf.clear();
    }

    let dict_key_data = dict_key_data
        .ok_or_else(|| XlsxIoError::CorruptFile("missing keyData".to_string()))?;
    let dict_password_key = dict_password_key.ok_or_else(|| {
        XlsxIoError::CorruptFile("missing password key encryptor".to_string())
    })?;

    let password_block_size = match dict_password_key.get("blockSize") {
        Some(_) => parse_attr_usize(&dict_password_key, "blockSize", "encryptedKey")?,
        None => N_LEN_AES_BLOCK,
    };

    Ok(SpecAgileInfo {
        key_data_salt: decode_base64_attr(&dict_key_data, "saltValue", "keyData")?,
        key_data_hash: EnumHashAlgorithm::from_name(derive_attr(
            &dict_key_data,
            "hashAlgorithm",
            "keyData",
        )?)?,
        key_data_block_size: parse_attr_usize(&dict_key_data, "blockSize", "keyData")?,
        key_data_key_bits: parse_attr_usize(&dict_key_data, "keyBits", "keyData")?,
        spin_count: derive_attr(&dict_password_key, "spinCount", "encryptedKey")?
            .trim()
            .parse::<u32>()
            .map_err(|_| XlsxIoError::CorruptFile("invalid encryptedKey.spinCount".to_string()))?,
        password_salt: decode_base64_attr(&dict_password_key, "saltValue", "encryptedKey")?,
        password_hash: EnumHashAlgorithm::from_name(derive_attr(
            &dict_password_key,
            "hashAlgorithm",
            "encryptedKey",
        )?)?,
        password_block_size,
        password_key_bits: parse_attr_usize(&dict_password_key, "keyBits", "encryptedKey")?,
        encrypted_verifier_hash_input: decode_base64_attr(
            &dict_password_key,
            "encryptedVerifierHashInput",
            "encryptedKey",
        )?,
        encrypted_verifier_hash_value: decode_base64_attr(
            &dict_password_key,
            "encryptedVerifierHashValue",
            "encryptedKey",
        )?,
        encrypted_key_value: decode_base64_attr(
            &dict_password_key,
            "encryptedKeyValue",
            "encryptedKey",
        )?,
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region KeyDerivation

fn derive_password_utf16le(password: &str) -> Vec<u8> {
    password
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

/// Resize to `n_len` bytes, padding with `0x36`.
fn derive_resized(bytes: &[u8], n_len: usize) -> Vec<u8> {
    let mut out = bytes.to_vec();
    out.resize(n_len, 0x36);
    out
}

fn derive_agile_iterated_hash(
    hash: EnumHashAlgorithm,
    salt: &[u8],
    password: &str,
    spin_count: u32,
) -> Vec<u8> {
    let mut h = hash.derive_digest(&[salt, &derive_password_utf16le(password)]);
    for i in 0..spin_count {
        h = hash.derive_digest(&[&i.to_le_bytes(), &h]);
    }
    h
}

fn derive_agile_block_key(
    hash: EnumHashAlgorithm,
    h_iterated: &[u8],
    block_key: &[u8],
    n_key_bits: usize,
) -> Vec<u8> {
    derive_resized(&hash.derive_digest(&[h_iterated, block_key]), n_key_bits / 8)
}

fn derive_standard_key(password: &str, salt: &[u8], n_key_bits: usize) -> Vec<u8> {
    let hash = EnumHashAlgorithm::Sha1;
    let mut h = hash.derive_digest(&[salt, &derive_password_utf16le(password)]);
    for i in 0..N_SPIN_COUNT_STANDARD {
        h = hash.derive_digest(&[&i.to_le_bytes(), &h]);
    }
    let h_final = hash.derive_digest(&[&h, &0u32.to_le_bytes()]);

    let mut buf_inner = [0x36u8; 64];
    let mut buf_outer = [0x5cu8; 64];
    for (idx, byte) in h_final.iter().enumerate() {
        buf_inner[idx] ^= byte;
        buf_outer[idx] ^= byte;
    }
    let mut key = hash.derive_digest(&[&buf_inner]);
    key.extend(hash.derive_digest(&[&buf_outer]));
    key.truncate(n_key_bits / 8);
    key
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Ciphers

fn decrypt_aes_cbc(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, XlsxIoError> {
    fn decrypt_with<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), XlsxIoError>
    where
        cbc::Decryptor<C>: KeyIvInit + BlockDecryptMut,
        C: cipher::BlockCipher + cipher::BlockDecryptMut,
    {
        cbc::Decryptor::<C>::new_from_slices(key, iv)
            .map_err(|_| XlsxIoError::CorruptFile("invalid AES key or IV length".to_string()))?
            .decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|_| XlsxIoError::CorruptFile("invalid AES-CBC ciphertext".to_string()))?;
        Ok(())
    }

    if data.len() % N_LEN_AES_BLOCK != 0 {
        return Err(XlsxIoError::CorruptFile(format!(
            "ciphertext length {} is not a multiple of the AES block",
            data.len()
        )));
    }
    let mut buf = data.to_vec();
    match key.len() {
        16 => decrypt_with::<Aes128>(key, iv, &mut buf)?,
        24 => decrypt_with::<Aes192>(key, iv, &mut buf)?,
        32 => decrypt_with::<Aes256>(key, iv, &mut buf)?,
        n => {
            return Err(XlsxIoError::CorruptFile(format!(
                "unsupported AES key length {n}"
            )));
        }
    }
    Ok(buf)
}

fn decrypt_aes_ecb(key: &[u8], data: &[u8]) -> Result<Vec<u8>, XlsxIoError> {
    fn decrypt_with<C: BlockDecrypt + KeyInit>(
        key: &[u8],
        buf: &mut [u8],
    ) -> Result<(), XlsxIoError> {
        let cipher = C::new_from_slice(key)
            .map_err(|_| XlsxIoError::CorruptFile("invalid AES key length".to_string()))?;
        for block in buf.chunks_mut(N_LEN_AES_BLOCK) {
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }

    if data.len() % N_LEN_AES_BLOCK != 0 {
        return Err(XlsxIoError::CorruptFile(format!(
            "ciphertext length {} is not a multiple of the AES block",
            data.len()
        )));
    }
    let mut buf = data.to_vec();
    match key.len() {
        16 => decrypt_with::<Aes128>(key, &mut buf)?,
        24 => decrypt_with::<Aes192>(key, &mut buf)?,
        32 => decrypt_with::<Aes256>(key, &mut buf)?,
        n => {
            return Err(XlsxIoError::CorruptFile(format!(
                "unsupported AES key length {n}"
            )));
        }
    }
    Ok(buf)
}

fn split_package_size(encrypted_package: &[u8]) -> Result<(usize, &[u8]), XlsxIoError> {
    if encrypted_package.len() < 8 {
        return Err(XlsxIoError::CorruptFile(
            "truncated EncryptedPackage".to_string(),
        ));
    }
    let (raw_size, body) = encrypted_package.split_at(8);
    let mut arr_size = [0u8; 8];
    arr_size.copy_from_slice(raw_size);
    let n_size = usize::try_from(u64::from_le_bytes(arr_size)).map_err(|_| {
        XlsxIoError::CorruptFile("EncryptedPackage size overflows".to_string())
    })?;
    if n_size > body.len() {
        return Err(XlsxIoError::CorruptFile(format!(
            "EncryptedPackage declares {n_size} bytes but holds {}",
            body.len()
        )));
    }
    Ok((n_size, body))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PackageDecryption

fn decrypt_agile_package(
    info: &SpecAgileInfo,
    encrypted_package: &[u8],
    password: &str,
) -> Result<Vec<u8>, XlsxIoError> {
    let h_iterated = derive_agile_iterated_hash(
        info.password_hash,
        &info.password_salt,
        password,
        info.spin_count,
    );
    let iv_password = derive_resized(&info.password_salt, info.password_block_size);

    let key_input = derive_agile_block_key(
        info.password_hash,
        &h_iterated,
        &BLOCK_KEY_VERIFIER_INPUT,
        info.password_key_bits,
    );
    let mut verifier_input =
        decrypt_aes_cbc(&key_input, &iv_password, &info.encrypted_verifier_hash_input)?;
    verifier_input.truncate(info.password_salt.len());

    let key_value = derive_agile_block_key(
        info.password_hash,
        &h_iterated,
        &BLOCK_KEY_VERIFIER_VALUE,
        info.password_key_bits,
    );
    let mut verifier_hash =
        decrypt_aes_cbc(&key_value, &iv_password, &info.encrypted_verifier_hash_value)?;
    verifier_hash.truncate(info.password_hash.len_output());

    if info.password_hash.derive_digest(&[&verifier_input]) != verifier_hash {
        return Err(XlsxIoError::WrongPassword);
    }

    let key_secret = derive_agile_block_key(
        info.password_hash,
        &h_iterated,
        &BLOCK_KEY_SECRET,
        info.password_key_bits,
    );
    let mut secret = decrypt_aes_cbc(&key_secret, &iv_password, &info.encrypted_key_value)?;
    secret.truncate(info.key_data_key_bits / 8);

    let (n_size, body) = split_package_size(encrypted_package)?;
    let mut out = Vec::with_capacity(body.len());
    for (idx_segment, segment) in body.chunks(N_LEN_AGILE_SEGMENT).enumerate() {
        let idx_segment = u32::try_from(idx_segment)
            .map_err(|_| XlsxIoError::CorruptFile("too many package segments".to_string()))?;
        let iv_segment = derive_resized(
            &info
                .key_data_hash
                .derive_digest(&[&info.key_data_salt, &idx_segment.to_le_bytes()]),
            info.key_data_block_size,
        );
        out.extend(decrypt_aes_cbc(&secret, &iv_segment, segment)?);
    }
    out.truncate(n_size);
    Ok(out)
}

fn decrypt_standard_package(
    info: &SpecStandardInfo,
    encrypted_package: &[u8],
    password: &str,
) -> Result<Vec<u8>, XlsxIoError> {
    let key = derive_standard_key(password, &info.salt, info.key_bits);

    let verifier = decrypt_aes_ecb(&key, &info.encrypted_verifier)?;
    let verifier_hash = decrypt_aes_ecb(&key, &info.encrypted_verifier_hash)?;
    let hash_expected = EnumHashAlgorithm::Sha1.derive_digest(&[&verifier]);
    if hash_expected[..] != verifier_hash[..N_LEN_SHA1] {
        return Err(XlsxIoError::WrongPassword);
    }

    let (n_size, body) = split_package_size(encrypted_package)?;
    let n_len_aligned = body.len() - body.len() % N_LEN_AES_BLOCK;
    let mut out = decrypt_aes_ecb(&key, &body[..n_len_aligned])?;
    if n_size > out.len() {
        return Err(XlsxIoError::CorruptFile(
            "EncryptedPackage payload is truncated".to_string(),
        ));
    }
    out.truncate(n_size);
    Ok(out)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Write;

    use aes::cipher::BlockEncrypt;
    use cipher::BlockEncryptMut;
    use proptest::prelude::*;

    use super::*;

    const C_PASSWORD: &str = "주문2024!";

    fn derive_payload() -> Vec<u8> {
        let mut payload = b"PK\x03\x04".to_vec();
        payload.extend((0..5000u32).map(|i| (i % 251) as u8));
        payload
    }

    fn derive_zero_padded(bytes: &[u8]) -> Vec<u8> {
        let mut out = bytes.to_vec();
        let n_rem = out.len() % N_LEN_AES_BLOCK;
        if n_rem != 0 {
            out.resize(out.len() + N_LEN_AES_BLOCK - n_rem, 0);
        }
        out
    }

    fn encrypt_aes256_cbc(key: &[u8], iv: &[u8], plain: &[u8]) -> Vec<u8> {
        let mut buf = derive_zero_padded(plain);
        let n_len = buf.len();
        cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut buf, n_len)
            .unwrap();
        buf
    }

    fn encrypt_aes128_ecb(key: &[u8], plain: &[u8]) -> Vec<u8> {
        let mut buf = derive_zero_padded(plain);
        let cipher = Aes128::new_from_slice(key).unwrap();
        for block in buf.chunks_mut(N_LEN_AES_BLOCK) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        buf
    }

    fn derive_ole(encryption_info: &[u8], encrypted_package: &[u8]) -> Vec<u8> {
        let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
        ole.create_stream(C_STREAM_ENCRYPTION_INFO)
            .unwrap()
            .write_all(encryption_info)
            .unwrap();
        ole.create_stream(C_STREAM_ENCRYPTED_PACKAGE)
            .unwrap()
            .write_all(encrypted_package)
            .unwrap();
        ole.into_inner().into_inner()
    }

    fn encrypt_agile(payload: &[u8], password: &str) -> Vec<u8> {
        let hash = EnumHashAlgorithm::Sha512;
        let salt_password = [0x11u8; 16];
        let salt_key_data = [0x22u8; 16];
        let secret = [0x07u8; 32];
        let verifier_input = [0x09u8; 16];
        let spin_count = 10;

        let h_iterated = derive_agile_iterated_hash(hash, &salt_password, password, spin_count);
        let enc_input = encrypt_aes256_cbc(
            &derive_agile_block_key(hash, &h_iterated, &BLOCK_KEY_VERIFIER_INPUT, 256),
            &salt_password,
            &verifier_input,
        );
        let enc_value = encrypt_aes256_cbc(
            &derive_agile_block_key(hash, &h_iterated, &BLOCK_KEY_VERIFIER_VALUE, 256),
            &salt_password,
            &hash.derive_digest(&[&verifier_input]),
        );
        let enc_key = encrypt_aes256_cbc(
            &derive_agile_block_key(hash, &h_iterated, &BLOCK_KEY_SECRET, 256),
            &salt_password,
            &secret,
        );

        let mut package = (payload.len() as u64).to_le_bytes().to_vec();
        for (idx, segment) in payload.chunks(N_LEN_AGILE_SEGMENT).enumerate() {
            let iv = derive_resized(
                &hash.derive_digest(&[&salt_key_data, &(idx as u32).to_le_bytes()]),
                16,
            );
            package.extend(encrypt_aes256_cbc(&secret, &iv, segment));
        }

        let xml = format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption" "#,
                r#"xmlns:p="http://schemas.microsoft.com/office/2006/keyEncryptor/password">"#,
                r#"<keyData saltSize="16" blockSize="16" keyBits="256" hashSize="64" "#,
                r#"cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="SHA512" "#,
                r#"saltValue="{}"/>"#,
                r#"<keyEncryptors><keyEncryptor uri="http://schemas.microsoft.com/office/2006/keyEncryptor/password">"#,
                r#"<p:encryptedKey spinCount="10" saltSize="16" blockSize="16" keyBits="256" "#,
                r#"hashSize="64" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" "#,
                r#"hashAlgorithm="SHA512" saltValue="{}" encryptedVerifierHashInput="{}" "#,
                r#"encryptedVerifierHashValue="{}" encryptedKeyValue="{}"/>"#,
                r#"</keyEncryptor></keyEncryptors></encryption>"#,
            ),
            STANDARD.encode(salt_key_data),
            STANDARD.encode(salt_password),
            STANDARD.encode(enc_input),
            STANDARD.encode(enc_value),
            STANDARD.encode(enc_key),
        );

        let mut info = Vec::new();
        info.extend(4u16.to_le_bytes());
        info.extend(4u16.to_le_bytes());
        info.extend(0x40u32.to_le_bytes());
        info.extend(xml.as_bytes());

        derive_ole(&info, &package)
    }

    fn encrypt_standard(payload: &[u8], password: &str) -> Vec<u8> {
        let salt = [0x33u8; 16];
        let key = derive_standard_key(password, &salt, 128);
        let verifier = [0x05u8; 16];
        let enc_verifier = encrypt_aes128_ecb(&key, &verifier);
        let enc_verifier_hash =
            encrypt_aes128_ecb(&key, &EnumHashAlgorithm::Sha1.derive_digest(&[&verifier]));

        let mut header = Vec::new();
        for n_field in [0x24u32, 0, CALG_AES_128, CALG_SHA1, 128, 0x18, 0, 0] {
            header.extend(n_field.to_le_bytes());
        }
        header.extend(derive_password_utf16le(
            "Microsoft Enhanced RSA and AES Cryptographic Provider\0",
        ));

        let mut info = Vec::new();
        info.extend(3u16.to_le_bytes());
        info.extend(2u16.to_le_bytes());
        info.extend(0x24u32.to_le_bytes());
        info.extend((header.len() as u32).to_le_bytes());
        info.extend(header);
        info.extend(16u32.to_le_bytes());
        info.extend(salt);
        info.extend(enc_verifier);
        info.extend(20u32.to_le_bytes());
        info.extend(enc_verifier_hash);

        let mut package = (payload.len() as u64).to_le_bytes().to_vec();
        package.extend(encrypt_aes128_ecb(&key, payload));

        derive_ole(&info, &package)
    }

    #[test]
    fn test_agile_package_decrypts_with_correct_password() {
        let payload = derive_payload();
        let bytes = encrypt_agile(&payload, C_PASSWORD);

        assert!(is_encrypted_package(&bytes));
        let out = decrypt_workbook_bytes(&bytes, Some(C_PASSWORD)).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_agile_package_rejects_wrong_password() {
        let bytes = encrypt_agile(&derive_payload(), C_PASSWORD);

        let err = decrypt_workbook_bytes(&bytes, Some("wrong")).unwrap_err();
        assert!(matches!(err, XlsxIoError::WrongPassword), "{err:?}");
    }

    #[test]
    fn test_standard_package_roundtrip_and_wrong_password() {
        let payload = derive_payload();
        let bytes = encrypt_standard(&payload, C_PASSWORD);

        assert_eq!(
            decrypt_workbook_bytes(&bytes, Some(C_PASSWORD)).unwrap(),
            payload
        );
        assert!(matches!(
            decrypt_workbook_bytes(&bytes, Some("nope")),
            Err(XlsxIoError::WrongPassword)
        ));
    }

    #[test]
    fn test_encrypted_package_without_password_is_rejected() {
        let bytes = encrypt_agile(&derive_payload(), C_PASSWORD);

        assert!(matches!(
            decrypt_workbook_bytes(&bytes, None),
            Err(XlsxIoError::PasswordRequired)
        ));
    }

    #[test]
    fn test_plain_zip_passes_through() {
        let bytes = b"PK\x03\x04plain".to_vec();

        assert!(!is_encrypted_package(&bytes));
        assert_eq!(decrypt_workbook_bytes(&bytes, Some("pw")).unwrap(), bytes);
        assert_eq!(decrypt_workbook_bytes(&bytes, None).unwrap(), bytes);
    }

    #[test]
    fn test_garbage_ole_header_is_corrupt() {
        let mut bytes = OLE_MAGIC.to_vec();
        bytes.extend([0xABu8; 600]);

        assert!(matches!(
            decrypt_workbook_bytes(&bytes, Some("pw")),
            Err(XlsxIoError::CorruptFile(_))
        ));
    }

    #[test]
    fn test_unknown_encryption_version_is_corrupt() {
        let mut info = Vec::new();
        info.extend(9u16.to_le_bytes());
        info.extend(9u16.to_le_bytes());
        info.extend(0u32.to_le_bytes());
        let bytes = derive_ole(&info, &[0u8; 24]);

        assert!(matches!(
            decrypt_workbook_bytes(&bytes, Some("pw")),
            Err(XlsxIoError::CorruptFile(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_encrypted_payloads_of_any_length_decrypt_exactly(
            body in proptest::collection::vec(any::<u8>(), 0..9000),
            if_agile in any::<bool>(),
        ) {
            let mut payload = b"PK\x03\x04".to_vec();
            payload.extend(body);
            let bytes = if if_agile {
                encrypt_agile(&payload, C_PASSWORD)
            } else {
                encrypt_standard(&payload, C_PASSWORD)
            };

            prop_assert_eq!(decrypt_workbook_bytes(&bytes, Some(C_PASSWORD)).unwrap(), payload);
        }
    }
}
