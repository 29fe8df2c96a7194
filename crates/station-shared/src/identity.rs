//! Station and operator identity.
//!
//! A station carries two Ed25519 keypairs: one for the human operator and
//! one for the station itself. Callsigns are derived deterministically from
//! the public keys (X1-class for operators, X3-class for stations) so the
//! same key always yields the same callsign.

use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::constants::{
    KDF_CONTEXT_OPERATOR_CALLSIGN, KDF_CONTEXT_STATION_CALLSIGN, OPERATOR_CALLSIGN_PREFIX,
    STATION_CALLSIGN_PREFIX,
};

/// Crockford base32 alphabet; no I, L, O, U, so callsigns read unambiguously.
const CALLSIGN_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Number of base32 characters following the class prefix.
const CALLSIGN_SUFFIX_LEN: usize = 6;

/// The two keypairs that make a station addressable.
#[derive(Clone)]
pub struct StationIdentity {
    station_key: SigningKey,
    operator_key: SigningKey,
}

/// Serializable form for persisting an identity.
#[derive(Serialize, Deserialize)]
pub struct IdentityExport {
    pub station_secret: [u8; 32],
    pub operator_secret: [u8; 32],
}

impl StationIdentity {
    /// Generate a fresh station + operator keypair.
    pub fn generate() -> Self {
        Self {
            station_key: SigningKey::generate(&mut OsRng),
            operator_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restore an identity from persisted secret bytes.
    pub fn from_export(export: &IdentityExport) -> Self {
        Self {
            station_key: SigningKey::from_bytes(&export.station_secret),
            operator_key: SigningKey::from_bytes(&export.operator_secret),
        }
    }

    pub fn to_export(&self) -> IdentityExport {
        IdentityExport {
            station_secret: *self.station_key.as_bytes(),
            operator_secret: *self.operator_key.as_bytes(),
        }
    }

    pub fn station_public_key(&self) -> [u8; 32] {
        self.station_key.verifying_key().to_bytes()
    }

    pub fn operator_public_key(&self) -> [u8; 32] {
        self.operator_key.verifying_key().to_bytes()
    }

    pub fn station_public_key_hex(&self) -> String {
        hex::encode(self.station_public_key())
    }

    pub fn operator_public_key_hex(&self) -> String {
        hex::encode(self.operator_public_key())
    }

    /// X3-class callsign identifying the station.
    pub fn station_callsign(&self) -> String {
        derive_callsign(
            STATION_CALLSIGN_PREFIX,
            KDF_CONTEXT_STATION_CALLSIGN,
            &self.station_public_key(),
        )
    }

    /// X1-class callsign identifying the operator.
    pub fn operator_callsign(&self) -> String {
        derive_callsign(
            OPERATOR_CALLSIGN_PREFIX,
            KDF_CONTEXT_OPERATOR_CALLSIGN,
            &self.operator_public_key(),
        )
    }

    /// Sign a message with the station key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.station_key.sign(message)
    }
}

impl std::fmt::Debug for StationIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationIdentity")
            .field("station_callsign", &self.station_callsign())
            .field("operator_callsign", &self.operator_callsign())
            .finish()
    }
}

/// Derive a callsign of the form `<prefix><6 base32 chars>` from a public
/// key using a BLAKE3 derive-key context.
pub fn derive_callsign(prefix: &str, context: &str, public_key: &[u8; 32]) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(public_key);
    let hash = hasher.finalize();

    let mut callsign = String::with_capacity(prefix.len() + CALLSIGN_SUFFIX_LEN);
    callsign.push_str(prefix);
    for &byte in hash.as_bytes().iter().take(CALLSIGN_SUFFIX_LEN) {
        callsign.push(CALLSIGN_ALPHABET[(byte % 32) as usize] as char);
    }
    callsign
}
