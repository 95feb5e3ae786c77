//! Public identities - who a message is from or to.

use serde::{Deserialize, Serialize};

use dm_crypto::IdentitySigner;

/// `(key_type, key)` pair identifying a user. Equality is byte-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicIdentity {
    pub key_type: u64,
    #[serde(with = "crate::b64")]
    pub key: Vec<u8>,
}

impl PublicIdentity {
    pub fn new(key_type: u64, key: impl Into<Vec<u8>>) -> Self {
        Self { key_type, key: key.into() }
    }

    /// Current identity of a signer.
    pub fn of(signer: &dyn IdentitySigner) -> Self {
        Self::new(signer.key_type(), signer.public_key_bytes())
    }

    /// Base64 key, the form users paste into the CLI.
    pub fn key_b64(&self) -> String {
        crate::b64::encode(&self.key)
    }

    pub fn fingerprint(&self) -> String {
        dm_crypto::identity::fingerprint(&self.key)
    }
}

impl std::fmt::Display for PublicIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.key_type, self.key_b64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_covers_type_and_key() {
        let a = PublicIdentity::new(1, vec![1, 2, 3]);
        assert_eq!(a, PublicIdentity::new(1, vec![1, 2, 3]));
        assert_ne!(a, PublicIdentity::new(2, vec![1, 2, 3]));
        assert_ne!(a, PublicIdentity::new(1, vec![1, 2, 4]));
    }

    #[test]
    fn json_shape() {
        let id = PublicIdentity::new(1, vec![0xff; 3]);
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!({"key_type": 1, "key": "////"}));
        let back: PublicIdentity = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
