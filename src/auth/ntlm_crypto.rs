//! NTLM cryptographic primitives
//!
//! LM and NTLM password hashing, DES key expansion, and the v1/v2
//! challenge-response calculations the session setup path validates
//! against. All comparisons of secret material are constant time.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};
use des::Des;
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use rand::rngs::OsRng;
use rand::RngCore;

/// DES plaintext constant for the LM hash
const LM_MAGIC: &[u8; 8] = b"KGS!@#$%";

/// Expand a 7-byte key half into an 8-byte DES key with odd parity.
///
/// The 56 input bits are spread across the top 7 bits of each output byte;
/// bit 0 of every byte is the odd-parity bit over the other seven.
pub fn expand_des_key(key7: &[u8; 7]) -> [u8; 8] {
    let mut key8 = [0u8; 8];
    for i in 0..8 {
        let hi = if i == 0 { 0 } else { key7[i - 1] << (8 - i) };
        let lo = if i == 7 { 0 } else { key7[i] >> i };
        let byte = (hi | lo) & 0xFE;
        let parity = byte.count_ones() % 2 == 0;
        key8[i] = if parity { byte | 0x01 } else { byte };
    }
    key8
}

fn des_encrypt(key7: &[u8; 7], plaintext: &[u8; 8]) -> Result<[u8; 8]> {
    let key8 = expand_des_key(key7);
    let des = Des::new_from_slice(&key8)
        .map_err(|e| Error::CryptoError(format!("DES key error: {}", e)))?;
    let mut block = GenericArray::clone_from_slice(plaintext);
    des.encrypt_block(&mut block);
    let mut out = [0u8; 8];
    out.copy_from_slice(&block);
    Ok(out)
}

fn utf16le_bytes(s: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        bytes.write_u16::<LittleEndian>(unit)?;
    }
    Ok(bytes)
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 16]> {
    let mut mac = <Hmac<Md5> as Mac>::new_from_slice(key)
        .map_err(|e| Error::CryptoError(format!("HMAC error: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Constant-time equality over byte slices of equal length.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Compute the LM hash of a password.
///
/// Uppercase, truncate or zero-pad to 14 bytes, DES-encrypt `KGS!@#$%`
/// under each 7-byte half.
pub fn lm_hash(password: &str) -> Result<[u8; 16]> {
    let mut pwd = [0u8; 14];
    for (i, b) in password.to_uppercase().bytes().take(14).enumerate() {
        pwd[i] = b;
    }

    let mut hash = [0u8; 16];
    let half0: [u8; 7] = pwd[0..7].try_into().unwrap_or([0; 7]);
    let half1: [u8; 7] = pwd[7..14].try_into().unwrap_or([0; 7]);
    hash[0..8].copy_from_slice(&des_encrypt(&half0, LM_MAGIC)?);
    hash[8..16].copy_from_slice(&des_encrypt(&half1, LM_MAGIC)?);
    Ok(hash)
}

/// Compute the NTLM hash of a password (MD4 over its UTF-16LE encoding).
pub fn ntlm_hash(password: &str) -> Result<[u8; 16]> {
    let mut hasher = Md4::new();
    hasher.update(&utf16le_bytes(password)?);
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&hasher.finalize());
    Ok(hash)
}

/// Compute the NTLMv2 hash: HMAC-MD5 keyed by the NTLM hash over
/// `UPPER(user) || UPPER(domain)` in UTF-16LE.
pub fn ntlmv2_hash(username: &str, domain: &str, password: &str) -> Result<[u8; 16]> {
    let key = ntlm_hash(password)?;
    let user_domain = format!("{}{}", username.to_uppercase(), domain.to_uppercase());
    hmac_md5(&key, &[&utf16le_bytes(&user_domain)?])
}

/// Compute a 24-byte LM or NTLM challenge response.
///
/// The 16-byte hash is zero-padded to 21 bytes, split into three 7-byte
/// DES keys, and each encrypts the server challenge.
pub fn v1_response(hash: &[u8; 16], challenge: &[u8; 8]) -> Result<[u8; 24]> {
    let mut padded = [0u8; 21];
    padded[0..16].copy_from_slice(hash);

    let mut response = [0u8; 24];
    for i in 0..3 {
        let key: [u8; 7] = padded[i * 7..i * 7 + 7].try_into().unwrap_or([0; 7]);
        response[i * 8..i * 8 + 8].copy_from_slice(&des_encrypt(&key, challenge)?);
    }
    Ok(response)
}

/// Compute a 24-byte LMv2 response:
/// `HMAC-MD5(hash, serverChallenge || clientChallenge) || clientChallenge`.
pub fn lmv2_response(
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
) -> Result<[u8; 24]> {
    let mac = hmac_md5(ntlmv2_hash, &[server_challenge, client_challenge])?;
    let mut response = [0u8; 24];
    response[0..16].copy_from_slice(&mac);
    response[16..24].copy_from_slice(client_challenge);
    Ok(response)
}

/// Compute an NTLMv2 response: `HMAC-MD5(hash, serverChallenge || blob) || blob`.
pub fn ntlmv2_response(
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    blob: &[u8],
) -> Result<Vec<u8>> {
    let mac = hmac_md5(ntlmv2_hash, &[server_challenge, blob])?;
    let mut response = Vec::with_capacity(16 + blob.len());
    response.extend_from_slice(&mac);
    response.extend_from_slice(blob);
    Ok(response)
}

/// Validate a 24-byte LM response against the stored LM hash.
pub fn validate_lm_response(
    response: &[u8],
    lm_hash: &[u8; 16],
    challenge: &[u8; 8],
) -> Result<bool> {
    if response.len() != 24 {
        return Ok(false);
    }
    let expected = v1_response(lm_hash, challenge)?;
    Ok(constant_time_eq(response, &expected))
}

/// Validate a 24-byte NTLM response against the stored NTLM hash.
pub fn validate_ntlm_response(
    response: &[u8],
    ntlm_hash: &[u8; 16],
    challenge: &[u8; 8],
) -> Result<bool> {
    if response.len() != 24 {
        return Ok(false);
    }
    let expected = v1_response(ntlm_hash, challenge)?;
    Ok(constant_time_eq(response, &expected))
}

/// Validate a 24-byte LMv2 response; the trailing 8 bytes carry the
/// client challenge the HMAC was computed over.
pub fn validate_lmv2_response(
    response: &[u8],
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
) -> Result<bool> {
    if response.len() != 24 {
        return Ok(false);
    }
    let client_challenge: [u8; 8] = response[16..24].try_into().unwrap_or([0; 8]);
    let expected = lmv2_response(ntlmv2_hash, server_challenge, &client_challenge)?;
    Ok(constant_time_eq(response, &expected))
}

/// Validate an NTLMv2 response; everything after the 16-byte HMAC is the
/// client blob the HMAC covers.
pub fn validate_ntlmv2_response(
    response: &[u8],
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
) -> Result<bool> {
    // The blob is never shorter than its 36 fixed bytes
    if response.len() < 16 + 36 {
        return Ok(false);
    }
    let expected = hmac_md5(ntlmv2_hash, &[server_challenge, &response[16..]])?;
    Ok(constant_time_eq(&response[0..16], &expected))
}

/// Generate a fresh 8-byte server challenge from the OS CSPRNG.
pub fn generate_challenge() -> [u8; 8] {
    let mut challenge = [0u8; 8];
    OsRng.fill_bytes(&mut challenge);
    challenge
}
