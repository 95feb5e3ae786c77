//! Identity seed loading for the CLI.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use zeroize::Zeroizing;

use dm_crypto::{Ed25519Identity, IdentitySigner};

pub const SEED_ENV: &str = "DM_IDENTITY_SEED";

/// Load the identity from `path` (hex seed file) or, failing that, from
/// `DM_IDENTITY_SEED`.
pub fn load(path: Option<&Path>) -> Result<Ed25519Identity> {
    if let Some(path) = path {
        let contents = Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("reading identity file {}", path.display()))?,
        );
        return Ok(Ed25519Identity::from_hex(&contents)?);
    }
    let seed = Zeroizing::new(
        std::env::var(SEED_ENV)
            .map_err(|_| anyhow!("no identity: pass --identity or set {SEED_ENV}"))?,
    );
    Ok(Ed25519Identity::from_hex(&seed)?)
}

/// Write a fresh seed to `path`. Refuses to overwrite.
pub fn generate(path: &Path) -> Result<Ed25519Identity> {
    if path.exists() {
        return Err(anyhow!("{} already exists", path.display()));
    }
    let identity = Ed25519Identity::generate();
    let seed = Zeroizing::new(hex::encode(identity.private_key_bytes().as_slice()));
    std::fs::write(path, seed.as_bytes())
        .with_context(|| format!("writing identity file {}", path.display()))?;
    Ok(identity)
}
