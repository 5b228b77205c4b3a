use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use util::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Verifies a device signature against the salt registered under the
/// claimed version. Comparison is constant-time (`Mac::verify_slice`).
pub fn verify(
    device_id: &str,
    signature_hex: &str,
    salt_version: u16,
    salts: &HashMap<u16, String>,
) -> Result<(), AppError> {
    let salt = salts
        .get(&salt_version)
        .ok_or_else(|| AppError::Unauthorized(format!("unknown salt version {salt_version}")))?;

    let signature = hex::decode(signature_hex)
        .map_err(|_| AppError::Unauthorized("malformed device signature".into()))?;

    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(device_id.as_bytes());

    mac.verify_slice(&signature)
        .map_err(|_| AppError::Unauthorized("device signature mismatch".into()))
}

/// Computes the hex-encoded signature a well-behaved client would send;
/// used by tests and by any first-party client code sharing this crate.
pub fn sign(device_id: &str, salt: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(device_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salts() -> HashMap<u16, String> {
        HashMap::from([(1, "salt-v1".to_string()), (2, "salt-v2".to_string())])
    }

    #[test]
    fn verifies_a_correctly_signed_device_id() {
        let salts = salts();
        let sig = sign("D1", "salt-v1");
        assert!(verify("D1", &sig, 1, &salts).is_ok());
    }

    #[test]
    fn rejects_signature_for_wrong_device() {
        let salts = salts();
        let sig = sign("D1", "salt-v1");
        assert!(verify("D2", &sig, 1, &salts).is_err());
    }

    #[test]
    fn rejects_signature_computed_with_stale_salt_version() {
        let salts = salts();
        let sig = sign("D1", "salt-v1");
        assert!(verify("D1", &sig, 2, &salts).is_err());
    }

    #[test]
    fn rejects_unknown_salt_version() {
        let salts = salts();
        let sig = sign("D1", "salt-v1");
        assert!(verify("D1", &sig, 99, &salts).is_err());
    }
}
