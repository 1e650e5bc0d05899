//! Registration tokens and agent credentials
//!
//! Two secrets exist in the system:
//!
//! - **Registration tokens**: single-use random values handed to an agent
//!   out of band; consumed exactly once at `POST /register` through the
//!   token store.
//! - **Credentials**: issued at registration and presented on every
//!   WebSocket connect. A credential is a MAC over the client ID and the
//!   issuance time, keyed with the coordinator's secret, so the coordinator
//!   can verify it statelessly.
//!
//! Credential format: `<client_id>.<issued_at>.<mac>` where `mac` is the
//! hex-encoded SHA-256 of `secret || client_id || issued_at`.

use sha2::{Digest, Sha256};

use crate::types::ClientId;

/// Length of a registration token in bytes (before hex encoding)
const TOKEN_BYTES: usize = 32;

/// Generate a new random registration token.
///
/// Returns a 64-character hex string (32 random bytes).
pub fn generate_registration_token() -> String {
    use rand::Rng;
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Generate a random credential-signing secret for a coordinator that has
/// none configured.
pub fn generate_secret() -> String {
    generate_registration_token()
}

/// Compare two strings in constant time to prevent timing attacks.
pub fn constant_time_eq(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }

    let mut result = 0u8;
    for (a, b) in provided.bytes().zip(expected.bytes()) {
        result |= a ^ b;
    }
    result == 0
}

/// Verifies an opaque credential and yields the agent it belongs to.
///
/// This is the only contract the session layer depends on; the MAC scheme
/// below is one implementation.
pub trait CredentialVerifier: Send + Sync {
    /// Returns the client ID the credential was issued for, or `None` if
    /// the credential is malformed or fails verification.
    fn verify(&self, credential: &str) -> Option<ClientId>;
}

/// MAC-based credential issuer and verifier
pub struct MacCredentials {
    secret: String,
}

impl MacCredentials {
    /// Create a credential scheme keyed with the given secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Issue a credential for a client, stamped with the current time
    pub fn issue(&self, client_id: &ClientId) -> String {
        let issued_at = crate::time::current_time_secs();
        let mac = self.mac(client_id.as_str(), issued_at);
        format!("{}.{}.{}", client_id, issued_at, mac)
    }

    fn mac(&self, client_id: &str, issued_at: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(client_id.as_bytes());
        hasher.update(issued_at.to_be_bytes());
        hex::encode(hasher.finalize())
    }
}

impl CredentialVerifier for MacCredentials {
    fn verify(&self, credential: &str) -> Option<ClientId> {
        // Client IDs are UUIDs and contain no dots, so the first two dots
        // delimit the three fields unambiguously.
        let mut parts = credential.splitn(3, '.');
        let client_id = parts.next()?;
        let issued_at: u64 = parts.next()?.parse().ok()?;
        let presented_mac = parts.next()?;

        if client_id.is_empty() {
            return None;
        }

        let expected = self.mac(client_id, issued_at);
        if constant_time_eq(presented_mac, &expected) {
            Some(ClientId::new(client_id))
        } else {
            None
        }
    }
}
