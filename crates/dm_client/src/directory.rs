//! Encryption key registration and lookup.

use std::sync::Arc;

use dm_crypto::EncryptionKeyPair;
use dm_proto::{
    api::{GetKeyRequest, RegisterKeyRequest},
    PublicIdentity,
};

use crate::{auth::AuthClient, error::DmError, relay::RelayApi};

#[derive(Clone)]
pub struct KeyDirectory {
    relay: Arc<dyn RelayApi>,
    auth: AuthClient,
}

impl KeyDirectory {
    pub fn new(relay: Arc<dyn RelayApi>, auth: AuthClient) -> Self {
        Self { relay, auth }
    }

    /// Publish our encryption public key, signed by the identity key.
    /// Registering the same key again succeeds.
    pub async fn register_keys(&self, keys: &EncryptionKeyPair) -> Result<(), DmError> {
        let public = keys.public_key();
        let signature = self.auth.signer().sign(public)?;
        let request = RegisterKeyRequest {
            x25519_public_key: public.to_vec(),
            signature,
        };
        let header = self.auth.build_auth_header().await?;
        let response = self.relay.register_key(&header, &request).await?;

        if response.success {
            tracing::info!(
                target: "dm_client",
                event = "register_key_ok",
                fingerprint = %keys.fingerprint()
            );
            return Ok(());
        }
        let reason = response.error.unwrap_or_else(|| "no reason given".into());
        if reason.to_ascii_lowercase().contains("already registered") {
            tracing::info!(
                target: "dm_client",
                event = "register_key_existing",
                fingerprint = %keys.fingerprint()
            );
            return Ok(());
        }
        tracing::error!(target: "dm_client", event = "register_key_rejected", reason = %reason);
        Err(DmError::Rejected(format!("key registration: {reason}")))
    }

    /// `Ok(None)` when the relay has no key for `identity`.
    pub async fn lookup_key(&self, identity: &PublicIdentity) -> Result<Option<[u8; 32]>, DmError> {
        let response = self
            .relay
            .get_key(&GetKeyRequest {
                identity: identity.clone(),
            })
            .await?;
        match (response.found, response.x25519_public_key) {
            (true, Some(key)) => {
                let len = key.len();
                let key: [u8; 32] = key.try_into().map_err(|_| {
                    DmError::Encoding(format!("registered key for {identity} is {len} bytes"))
                })?;
                Ok(Some(key))
            }
            _ => Ok(None),
        }
    }
}
