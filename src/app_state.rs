// Application state management

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::auth::{AuthError, NonceRegistry, SignedRequest};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::public_feed::FeedSyncResult;
use crate::wager::{
    Address, EngineParams, EntitlementRegistry, FriendMarketEngine, Payout, PublicMarketBook, PublicMarketId,
};

pub type SharedState = Arc<Mutex<AppState>>;

pub const MAX_ACTIVITY_ENTRIES: usize = 1000;

pub struct AppState {
    pub engine: FriendMarketEngine,
    pub entitlements: EntitlementRegistry,
    pub public_markets: PublicMarketBook,
    pub nonces: NonceRegistry,
    pub activity: Vec<String>,
    pub clock: Arc<dyn Clock>,
    /// `None` keeps everything in memory
    pub state_path: Option<PathBuf>,
    pub faucet_amount: Decimal,
    pub last_feed_sync: Option<FeedSyncResult>,
}

/// Everything that survives a restart
#[derive(Serialize, Deserialize)]
struct PersistedState {
    engine: FriendMarketEngine,
    entitlements: EntitlementRegistry,
    public_markets: PublicMarketBook,
    #[serde(default)]
    nonces: NonceRegistry,
}

impl AppState {
    pub fn new(params: EngineParams, entitlements: EntitlementRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine: FriendMarketEngine::new(params),
            entitlements,
            public_markets: PublicMarketBook::new(),
            nonces: NonceRegistry::new(),
            activity: Vec::new(),
            clock,
            state_path: None,
            faucet_amount: Decimal::new(100, 0),
            last_feed_sync: None,
        }
    }

    /// Builds the server state and restores `STATE_PATH` when it exists.
    /// A state file that exists but cannot be read is an error, not a fresh start.
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let entitlements = if config.open_creation {
            EntitlementRegistry::open()
        } else {
            EntitlementRegistry::allowlist()
        };
        let mut state = Self::new(config.engine_params(), entitlements, Arc::new(SystemClock));
        state.faucet_amount = config.faucet_amount;
        state.state_path = Some(PathBuf::from(&config.state_path));

        if state.load_from_disk()? {
            info!(path = %config.state_path, markets = state.engine.markets().count(), "loaded persisted state");
        } else {
            info!(path = %config.state_path, "no persisted state found, starting fresh");
        }
        state.log_activity("🚀", "STARTUP", &format!("owner {} | oracle timeout {}s", state.engine.owner(), state.engine.oracle_timeout()));
        Ok(state)
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Verifies a signed request for `path` at the current time, consumes its
    /// nonce and decodes the payload. Returns the sender's address.
    pub fn authenticate<T: DeserializeOwned>(
        &mut self,
        path: &str,
        request: SignedRequest,
    ) -> Result<(Address, T), AuthError> {
        let caller = request.validate(path, self.now())?;
        let payload = serde_json::from_value(request.payload).map_err(|e| AuthError::InvalidPayload(e.to_string()))?;
        self.nonces.check_and_record(&caller, request.nonce)?;
        Ok((caller, payload))
    }

    /// Settles whatever is pegged to a public market that now has an outcome
    pub fn settle_pegged(&mut self, public_market_id: PublicMarketId, settler: &Address) -> Vec<Payout> {
        let now = self.now();
        let payouts = self
            .engine
            .settle_pegged_markets(&self.public_markets, public_market_id, settler, now);
        if !payouts.is_empty() {
            info!(public_market_id, settled = payouts.len(), "🔗 pegged markets settled");
        }
        payouts
    }

    pub fn log_activity(&mut self, emoji: &str, action: &str, details: &str) {
        let timestamp = chrono::Local::now().format("%H:%M:%S");
        let entry = format!("[{}] {} {} | {}", timestamp, emoji, action, details);
        info!(target: "activity", "{} {} | {}", emoji, action, details);
        self.activity.push(entry);
        if self.activity.len() > MAX_ACTIVITY_ENTRIES {
            self.activity.remove(0);
        }
    }

    /// Moves the engine's event journal into the activity log
    pub fn record_events(&mut self) -> usize {
        let events = self.engine.drain_events();
        for event in &events {
            let (emoji, action, details) = event.describe();
            self.log_activity(emoji, action, &details);
        }
        events.len()
    }

    /// Called after every successful mutation
    pub fn commit(&mut self) {
        self.record_events();
        if let Err(e) = self.save_to_disk() {
            warn!(error = %e, "failed to persist state");
        }
    }

    pub fn save_to_disk(&self) -> Result<(), String> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let persisted = PersistedState {
            engine: self.engine.clone(),
            entitlements: self.entitlements.clone(),
            public_markets: self.public_markets.clone(),
            nonces: self.nonces.clone(),
        };
        let json = serde_json::to_string_pretty(&persisted)
            .map_err(|e| format!("Failed to serialize state: {}", e))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        // Write beside the target then rename, so a crash never leaves a truncated file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| format!("Failed to write {}: {}", tmp.display(), e))?;
        std::fs::rename(&tmp, path).map_err(|e| format!("Failed to replace state file: {}", e))?;
        Ok(())
    }

    /// `Ok(false)` when there is nothing to load
    pub fn load_from_disk(&mut self) -> Result<bool, String> {
        let Some(path) = self.state_path.clone() else {
            return Ok(false);
        };
        let Some(persisted) = read_persisted(&path)? else {
            return Ok(false);
        };

        let params = self.engine.params().clone();
        self.engine = persisted.engine.with_params(params);
        self.entitlements = persisted.entitlements;
        self.public_markets = persisted.public_markets;
        self.nonces = persisted.nonces;
        Ok(true)
    }
}

fn read_persisted(path: &Path) -> Result<Option<PersistedState>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path).map_err(|e| format!("Failed to read state file: {}", e))?;
    let persisted = serde_json::from_str(&json)
        .map_err(|e| format!("Failed to deserialize state file {}: {}", path.display(), e))?;
    Ok(Some(persisted))
}

/// Locks the shared state, recovering the guard if a handler panicked mid-request
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::wager::{Address, StakeAsset};
    use rust_decimal_macros::dec;

    fn test_state() -> AppState {
        AppState::new(EngineParams::default(), EntitlementRegistry::open(), Arc::new(ManualClock::new(1_700_000_000)))
    }

    #[test]
    fn test_activity_log_is_bounded() {
        let mut state = test_state();
        for i in 0..(MAX_ACTIVITY_ENTRIES + 5) {
            state.log_activity("📝", "TEST", &i.to_string());
        }
        assert_eq!(state.activity.len(), MAX_ACTIVITY_ENTRIES);
        assert!(state.activity[0].ends_with("| 5"));
    }

    #[test]
    fn test_record_events_drains_journal() {
        let mut state = test_state();
        let now = state.now();
        state
            .engine
            .fund_account(&Address::new("0xa11ce"), &StakeAsset::Native, dec!(5), now)
            .unwrap();
        assert_eq!(state.record_events(), 1);
        assert_eq!(state.record_events(), 0);
        assert!(state.activity[0].contains("ACCOUNT_FUNDED"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("friend_markets_state_{}.json", uuid::Uuid::new_v4()));
        let mut state = test_state();
        state.state_path = Some(path.clone());
        let now = state.now();
        state
            .engine
            .fund_account(&Address::new("0xb0b"), &StakeAsset::Native, dec!(7), now)
            .unwrap();
        state.entitlements.grant(&Address::new("0xb0b")).unwrap();
        state.public_markets.register(9, Some("Will it rain?".into()));
        state.commit();

        let mut restored = test_state();
        restored.state_path = Some(path.clone());
        assert!(restored.load_from_disk().unwrap());
        assert_eq!(restored.engine.balance_of(&Address::new("0xb0b"), &StakeAsset::Native), dec!(7));
        assert!(restored.entitlements.holders().any(|a| a == &Address::new("0xb0b")));
        assert!(restored.public_markets.get(9).is_some());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let path = std::env::temp_dir().join(format!("friend_markets_state_{}.json", uuid::Uuid::new_v4()));
        let mut state = test_state();
        state.state_path = Some(path.clone());
        state.save_to_disk().unwrap();
        state.save_to_disk().unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_corrupt_state_file_is_rejected() {
        let path = std::env::temp_dir().join(format!("friend_markets_state_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{\"engine\": {\"markets\": ").unwrap();

        let mut state = test_state();
        state.state_path = Some(path.clone());
        let err = state.load_from_disk().unwrap_err();
        assert!(err.contains("Failed to deserialize state file"));

        let config = Config { state_path: path.display().to_string(), ..Config::default() };
        assert!(AppState::from_config(&config).is_err());
        // The damaged file is left for the operator
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"engine\": {\"markets\": ");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_authenticate_consumes_nonce() {
        use crate::auth::{address_from_pubkey, SignedRequest};
        use ed25519_dalek::SigningKey;

        let key = SigningKey::from_bytes(&[7; 32]);
        let mut state = test_state();
        let now = state.now();
        let request = SignedRequest::sign(&key, "/markets/1/leave", 1, now, serde_json::json!({}));

        let (caller, _): (Address, serde_json::Value) =
            state.authenticate("/markets/1/leave", request.clone()).unwrap();
        assert_eq!(caller, address_from_pubkey(&key.verifying_key()));
        assert_eq!(
            state.authenticate::<serde_json::Value>("/markets/1/leave", request).unwrap_err(),
            AuthError::StaleNonce { last: 1, got: 1 }
        );
    }

    #[test]
    fn test_load_without_file_is_fresh_start() {
        let mut state = test_state();
        state.state_path = Some(std::env::temp_dir().join(format!("missing_{}.json", uuid::Uuid::new_v4())));
        assert!(!state.load_from_disk().unwrap());
    }
}
