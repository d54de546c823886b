//! WPA pre-shared key derivation.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;

const PBKDF2_ROUNDS: u32 = 4096;
const PSK_BYTES: usize = 32;

/// Length of a hex-encoded PSK. Passphrases are limited to 63 characters,
/// so a 64-character value is always an already derived key.
pub const HEX_PSK_LEN: usize = PSK_BYTES * 2;

/// Derives the hex PSK the supplicant expects from a passphrase and SSID.
///
/// A 64-character `passphrase` is returned unchanged. Otherwise the key is
/// PBKDF2-HMAC-SHA1 over the passphrase, salted with the SSID, 4096 rounds.
pub fn derive_psk(passphrase: &str, ssid: &str) -> String {
    if passphrase.chars().count() == HEX_PSK_LEN {
        return passphrase.to_string();
    }

    let mut key = [0u8; PSK_BYTES];
    pbkdf2_hmac::<Sha1>(passphrase.as_bytes(), ssid.as_bytes(), PBKDF2_ROUNDS, &mut key);
    hex::encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_ieee_test_vector() {
        assert_eq!(
            derive_psk("password", "IEEE"),
            "f42c6fc52df0ebef9ebb4b90b38a5f902e83fe1b135a70e23aed762e9710a12e"
        );
    }

    #[test]
    fn is_deterministic() {
        let first = derive_psk("secret123", "HomeNet");
        assert_eq!(first, derive_psk("secret123", "HomeNet"));
        assert_eq!(first.len(), HEX_PSK_LEN);
        assert_ne!(first, derive_psk("secret123", "homenet"));
    }

    #[test]
    fn passes_through_derived_keys() {
        let derived = "f42c6fc52df0ebef9ebb4b90b38a5f902e83fe1b135a70e23aed762e9710a12e";
        assert_eq!(derive_psk(derived, "AnySsid"), derived);
    }
}
