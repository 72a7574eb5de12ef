use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::anyhow;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pasetors::{keys::SymmetricKey, version4::V4};
use rand::{rngs::OsRng, RngCore};
use roster_core::{DisplayName, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{
    directory::{UserAccount, UserDirectory},
    realtime::connection_registry::RegistryState,
};

pub const DEFAULT_JSON_BODY_LIMIT_BYTES: usize = 1_048_576;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_GATEWAY_OUTBOUND_QUEUE: usize = 256;
pub const DEFAULT_MAX_GATEWAY_EVENT_BYTES: usize = roster_protocol::MAX_EVENT_BYTES;
pub(crate) const TOKEN_KEY_BYTES: usize = 32;
pub(crate) const METRICS_TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub(crate) static METRICS_STATE: OnceLock<MetricsState> = OnceLock::new();

#[derive(Default)]
pub(crate) struct MetricsState {
    pub(crate) auth_failures: Mutex<HashMap<&'static str, u64>>,
    pub(crate) ws_disconnects: Mutex<HashMap<&'static str, u64>>,
    pub(crate) session_evictions: Mutex<u64>,
    pub(crate) gateway_events_emitted: Mutex<HashMap<(&'static str, &'static str), u64>>,
    pub(crate) gateway_events_dropped: Mutex<HashMap<(&'static str, &'static str, &'static str), u64>>,
    pub(crate) gateway_events_parse_rejected: Mutex<HashMap<(&'static str, &'static str), u64>>,
    pub(crate) gateway_events_unknown_received: Mutex<HashMap<String, u64>>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub gateway_outbound_queue: usize,
    pub max_gateway_event_bytes: usize,
    /// Base64-encoded 32-byte symmetric key shared with the external token
    /// issuer. `None` generates a random key, which only makes sense for
    /// tests that never verify externally minted tokens.
    pub token_key_base64: Option<String>,
    pub directory_accounts: Vec<DirectoryAccount>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_JSON_BODY_LIMIT_BYTES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            gateway_outbound_queue: DEFAULT_GATEWAY_OUTBOUND_QUEUE,
            max_gateway_event_bytes: DEFAULT_MAX_GATEWAY_EVENT_BYTES,
            token_key_base64: None,
            directory_accounts: Vec::new(),
        }
    }
}

/// One directory account as it appears in the seed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryAccount {
    pub user_id: String,
    pub display_name: String,
    pub active: bool,
}

#[derive(Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) gateway_outbound_queue: usize,
    pub(crate) max_gateway_event_bytes: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub(crate) registry: Arc<RwLock<RegistryState>>,
    pub(crate) directory: UserDirectory,
    pub(crate) token_key: Arc<SymmetricKey<V4>>,
    pub(crate) runtime: Arc<RuntimeConfig>,
}

impl AppState {
    pub(crate) fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let key_bytes = match &config.token_key_base64 {
            Some(encoded) => {
                let decoded = STANDARD
                    .decode(encoded)
                    .map_err(|e| anyhow!("token key is not valid base64: {e}"))?;
                let bytes: [u8; TOKEN_KEY_BYTES] = decoded
                    .try_into()
                    .map_err(|_| anyhow!("token key must decode to {TOKEN_KEY_BYTES} bytes"))?;
                bytes
            }
            None => {
                let mut bytes = [0_u8; TOKEN_KEY_BYTES];
                OsRng.fill_bytes(&mut bytes);
                bytes
            }
        };
        let token_key = SymmetricKey::<V4>::from(&key_bytes)
            .map_err(|e| anyhow!("token key init failed: {e}"))?;

        let mut accounts = HashMap::new();
        for account in &config.directory_accounts {
            let user_id = UserId::try_from(account.user_id.clone())
                .map_err(|e| anyhow!("directory account user id {:?}: {e}", account.user_id))?;
            let display_name = DisplayName::try_from(account.display_name.clone()).map_err(|e| {
                anyhow!("directory account display name {:?}: {e}", account.display_name)
            })?;
            accounts.insert(
                user_id,
                UserAccount {
                    user_id,
                    display_name: String::from(display_name),
                    active: account.active,
                },
            );
        }

        Ok(Self {
            registry: Arc::new(RwLock::new(RegistryState::default())),
            directory: UserDirectory::from_accounts(accounts),
            token_key: Arc::new(token_key),
            runtime: Arc::new(RuntimeConfig {
                gateway_outbound_queue: config.gateway_outbound_queue,
                max_gateway_event_bytes: config.max_gateway_event_bytes,
            }),
        })
    }
}

/// Identity resolved by the handshake authenticator. The display name is a
/// snapshot of the directory record at handshake time.
#[derive(Debug, Clone)]
pub(crate) struct Identity {
    pub(crate) user_id: UserId,
    pub(crate) display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionControl {
    Open,
    Close { reason: &'static str },
}
