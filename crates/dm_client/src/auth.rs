//! Challenge-response bearer credentials.
//!
//! Every authenticated call fetches its own challenge; credentials are never
//! cached or reused.

use std::sync::Arc;

use dm_crypto::IdentitySigner;
use dm_proto::{api::AuthCredential, PublicIdentity};

use crate::{error::DmError, relay::RelayApi};

#[derive(Clone)]
pub struct AuthClient {
    relay: Arc<dyn RelayApi>,
    signer: Arc<dyn IdentitySigner>,
}

impl AuthClient {
    pub fn new(relay: Arc<dyn RelayApi>, signer: Arc<dyn IdentitySigner>) -> Self {
        Self { relay, signer }
    }

    pub fn signer(&self) -> &Arc<dyn IdentitySigner> {
        &self.signer
    }

    /// `"Bearer <base64(json AuthCredential)>"` for one request.
    pub async fn build_auth_header(&self) -> Result<String, DmError> {
        let challenge = self.relay.challenge().await?;
        let nonce = challenge
            .nonce()
            .map_err(|e| DmError::Authentication(format!("cannot decode challenge body: {e}")))?;
        let signature = self
            .signer
            .sign(&nonce)
            .map_err(|e| DmError::Authentication(format!("cannot sign challenge: {e}")))?;

        let credential = AuthCredential {
            challenge_response: challenge,
            identity: PublicIdentity::of(self.signer.as_ref()),
            signature,
        };
        Ok(credential.to_bearer()?)
    }
}
