use std::sync::Arc;

use agent_core::{AuditLog, EngineError, PriceOracle, RandomSource, RunReport, UserState};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::run_cycle::{run_cycle, CycleContext};

/// Everything persisted for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub user: UserState,
    #[serde(default)]
    pub audit: AuditLog,
}

impl SessionState {
    pub fn new(user: UserState) -> Self {
        Self {
            user,
            audit: AuditLog::new(),
        }
    }
}

/// Single-writer handle to one user's state. Every mutation goes through
/// the lock, so cycles for the same agent never overlap.
pub struct UserSession {
    user_id: String,
    state: Mutex<SessionState>,
}

impl UserSession {
    pub fn new(user_id: impl Into<String>, state: SessionState) -> Self {
        Self {
            user_id: user_id.into(),
            state: Mutex::new(state),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn run_cycle(
        &self,
        agent_id: &str,
        reason: &str,
        prices: &(dyn PriceOracle + Sync),
        rng: &mut (dyn RandomSource + Send),
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<RunReport, EngineError> {
        let mut guard = self.state.lock().await;
        let SessionState { user, audit } = &mut *guard;
        let mut ctx = CycleContext {
            now,
            prices,
            rng,
            audit,
        };
        run_cycle(user, agent_id, reason, &mut ctx, config)
    }

    /// Run `f` with exclusive access to the state.
    pub async fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut guard = self.state.lock().await;
        f(&mut guard)
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }
}

/// Live sessions keyed by user id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<UserSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<UserSession>> {
        self.sessions.get(user_id).map(|s| Arc::clone(s.value()))
    }

    /// Existing session for `user_id`, or one built from `init`.
    pub fn get_or_insert_with(
        &self,
        user_id: &str,
        init: impl FnOnce() -> SessionState,
    ) -> Arc<UserSession> {
        let entry = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(UserSession::new(user_id, init())));
        Arc::clone(entry.value())
    }

    pub fn remove(&self, user_id: &str) -> Option<Arc<UserSession>> {
        self.sessions.remove(user_id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{AutonomyMode, DecisionStatus, PriceMap, ScriptedRandom};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 11, 0, 0).unwrap()
    }

    fn auto_user() -> (SessionState, String) {
        let mut user = UserState::new(now(), dec!(1000));
        user.agents[0].mode = AutonomyMode::Auto;
        let id = user.agents[0].id.clone();
        (SessionState::new(user), id)
    }

    #[test]
    fn registry_reuses_sessions() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_insert_with("alice", || auto_user().0);
        let b = registry.get_or_insert_with("alice", || panic!("should not rebuild"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("bob").is_none());
        assert!(registry.remove("alice").is_some());
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cycles_respect_daily_cap() {
        let (state, agent_id) = auto_user();
        let registry = Arc::new(SessionRegistry::new());
        let session = registry.get_or_insert_with("alice", || state);
        let config = Arc::new(EngineConfig {
            watchlist: vec!["ethereum".into()],
            ..EngineConfig::default()
        });
        let mut prices = PriceMap::new();
        prices.insert("ethereum".into(), dec!(400));
        let prices = Arc::new(prices);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let session = Arc::clone(&session);
            let config = Arc::clone(&config);
            let prices = Arc::clone(&prices);
            let agent_id = agent_id.clone();
            handles.push(tokio::spawn(async move {
                // trade branch, only asset, BUY
                let mut rng = ScriptedRandom::new([0.5, 0.0, 0.0]);
                session
                    .run_cycle(&agent_id, "concurrent", &*prices, &mut rng, &config, now())
                    .await
                    .unwrap()
            }));
        }

        let mut executed = 0;
        for h in handles {
            if h.await.unwrap().decision.status == DecisionStatus::Executed {
                executed += 1;
            }
        }
        assert_eq!(executed, 2);

        let state = session.snapshot().await;
        let agent = state.user.agent(&agent_id).unwrap();
        assert_eq!(agent.portfolio.trades.len(), 2);
        assert_eq!(agent.runs.len(), 10);
        assert_eq!(agent.approvals.len(), 8);
    }

    #[tokio::test]
    async fn with_state_sees_cycle_results() {
        let (state, agent_id) = auto_user();
        let session = UserSession::new("carol", state);
        let prices = PriceMap::new();
        let mut rng = ScriptedRandom::new([0.99]);
        let config = EngineConfig::default();

        session
            .run_cycle(&agent_id, "manual", &prices, &mut rng, &config, now())
            .await
            .unwrap();

        let queued = session
            .with_state(|s| s.user.agent(&agent_id).map(|a| a.approvals.len()))
            .await
            .unwrap();
        assert_eq!(queued, 1);
        assert_eq!(session.user_id(), "carol");
        assert!(!session.snapshot().await.audit.is_empty());
    }
}
