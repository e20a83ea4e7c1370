//! Alert signature verification.
//!
//! Alerts are logged only; the signature decides whether the log line is
//! trusted or flagged as forged.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use shared_types::double_sha256;

use super::messages::AlertMessage;

/// Check `alert` against the network alert key (SEC1 bytes).
///
/// The signature is DER-encoded ECDSA over the double-SHA256 of the payload.
/// Malformed keys or signatures verify as `false`.
pub fn verify_alert(alert: &AlertMessage, public_key: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(&alert.signature) else {
        return false;
    };
    // Early alerts were signed without low-S normalization.
    let signature = signature.normalize_s().unwrap_or(signature);
    let digest = double_sha256(&alert.payload);
    key.verify_prehash(&digest, &signature).is_ok()
}
