//! dm_client - Polycentric DM relay client
//!
//! # Modules
//! - `config`    - relay URL normalisation, environment overrides
//! - `relay`     - REST transport behind the [`RelayApi`] trait
//! - `auth`      - per-request challenge/response bearer credentials
//! - `directory` - encryption key registration and lookup
//! - `view`      - deduplicated, time-ordered message view
//! - `realtime`  - WebSocket push delivery
//! - `session`   - [`DmSession`], tying it all together

pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod realtime;
pub mod relay;
pub mod session;
pub mod view;

pub use auth::AuthClient;
pub use config::{ClientConfig, ServerConfig};
pub use directory::KeyDirectory;
pub use error::DmError;
pub use events::SessionEvent;
pub use relay::{HttpRelay, RelayApi};
pub use session::{DmSession, HistoryPage, SessionState};
pub use view::MessageView;
