//! Relay endpoints and client tunables.

use dm_crypto::EncryptionAlgorithm;

use crate::error::DmError;

pub const DEFAULT_RELAY_URL: &str = "https://dm.polycentric.io";
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub http_url: String,
    pub websocket_url: String,
    /// Upper bound on serialized plaintext per message.
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Normalise a user-supplied relay address.
    ///
    /// `dm.example.org/` → `https://dm.example.org` + `wss://dm.example.org/ws`
    pub fn from_base_url(base: &str) -> Result<Self, DmError> {
        let trimmed = base.trim();
        if trimmed.is_empty() {
            return Err(DmError::Configuration("relay URL is empty".into()));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };
        let http_url = with_scheme.trim_end_matches('/').to_string();

        let socket_base = if let Some(rest) = http_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = http_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(DmError::Configuration(format!(
                "unsupported relay URL scheme: {http_url}"
            )));
        };
        if socket_base.ends_with("://") {
            return Err(DmError::Configuration(format!("relay URL has no host: {base}")));
        }

        Ok(Self {
            http_url,
            websocket_url: format!("{socket_base}/ws"),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub history_page_size: u32,
    /// Suites this platform can run, in no particular order.
    pub ciphers: Vec<EncryptionAlgorithm>,
}

impl ClientConfig {
    pub fn new(server: ServerConfig) -> Self {
        Self {
            server,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            ciphers: EncryptionAlgorithm::PREFERENCE.to_vec(),
        }
    }

    /// `DM_RELAY_URL`, `DM_MAX_MESSAGE_SIZE`, `DM_HISTORY_PAGE_SIZE`.
    pub fn from_env() -> Result<Self, DmError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DmError> {
        let url = lookup("DM_RELAY_URL").unwrap_or_else(|| DEFAULT_RELAY_URL.to_string());
        let mut config = Self::new(ServerConfig::from_base_url(&url)?);

        if let Some(raw) = lookup("DM_MAX_MESSAGE_SIZE") {
            config.server.max_message_size = raw.trim().parse().map_err(|_| {
                DmError::Configuration(format!("DM_MAX_MESSAGE_SIZE is not a number: {raw}"))
            })?;
        }
        if let Some(raw) = lookup("DM_HISTORY_PAGE_SIZE") {
            config.history_page_size = match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(DmError::Configuration(format!(
                        "DM_HISTORY_PAGE_SIZE must be a positive number: {raw}"
                    )))
                }
            };
        }
        Ok(config)
    }
}
