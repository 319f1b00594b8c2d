//! Keypair fingerprints. The canonical form everywhere in this workspace is
//! MD5 over the PKIX (SubjectPublicKeyInfo DER) encoding of the public key,
//! rendered as colon-separated hex pairs, which is what EC2 reports for
//! imported keys.

use md5::{Digest, Md5};
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPublicKey;

use crate::error::ClientError;

/// Fingerprint of an in-memory RSA public key.
pub fn pkix_md5(public: &RsaPublicKey) -> Result<String, ClientError> {
    let der = public
        .to_public_key_der()
        .map_err(|e| ClientError::Internal(format!("encode public key: {}", e)))?;
    Ok(hex_pairs(&Md5::digest(der.as_bytes())))
}

/// Fingerprint of a public key in OpenSSH authorized-keys form.
pub fn openssh_md5(openssh: &str) -> Result<String, ClientError> {
    let key = ssh_key::PublicKey::from_openssh(openssh.trim())
        .map_err(|e| ClientError::Internal(format!("parse openssh public key: {}", e)))?;
    let rsa_pub = key
        .key_data()
        .rsa()
        .ok_or_else(|| ClientError::Internal("public key is not RSA".into()))?;
    let public = RsaPublicKey::try_from(rsa_pub)
        .map_err(|e| ClientError::Internal(format!("convert openssh public key: {}", e)))?;
    pkix_md5(&public)
}

fn hex_pairs(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
