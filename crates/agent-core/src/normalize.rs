//! Lenient loading of persisted agent records.
//!
//! Stored state may come from older builds or hand edits. Loading never
//! fails on a malformed field: the field falls back to its default and a
//! [`SchemaRepair`] is recorded so callers can log what was fixed.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::types::{new_agent_id, sanitize_name};
use crate::{
    Agent, AgentEvent, AutonomyMode, EngineError, Portfolio, Proposal, Receipt, RunReport,
    TradeRecord, UserState, ValueSnapshot, AGENT_EVENTS_LIMIT, APPROVALS_LIMIT,
    DEFAULT_CATEGORY, DEFAULT_CROWD_SCORE, DEFAULT_STARTING_CASH, POSITION_EPSILON, RUNS_LIMIT,
    TRADE_LOG_LIMIT, VALUE_HISTORY_LIMIT,
};

const BOT_ID_SPACE: u32 = 10_000;

/// One field that was missing its expected shape and was reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaRepair {
    pub path: String,
    pub detail: String,
}

impl SchemaRepair {
    fn new(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// A loaded value together with the repairs applied while loading it.
#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub value: T,
    pub repairs: Vec<SchemaRepair>,
}

/// Derive a `BOT-####` id from an agent id, probing past ids already taken.
///
/// Once every four-digit id is taken, a numeric suffix is appended.
pub fn bot_id_for(agent_id: &str, taken: &HashSet<String>) -> String {
    let digest = Sha256::digest(agent_id.as_bytes());
    let base = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % BOT_ID_SPACE;
    (0..BOT_ID_SPACE)
        .map(|i| format!("BOT-{:04}", (base + i) % BOT_ID_SPACE))
        .find(|cand| !taken.contains(cand))
        .unwrap_or_else(|| {
            (1u64..)
                .map(|n| format!("BOT-{base:04}-{n}"))
                .find(|cand| !taken.contains(cand))
                .unwrap_or_default()
        })
}

struct Loader<'a> {
    prefix: String,
    repairs: &'a mut Vec<SchemaRepair>,
}

impl<'a> Loader<'a> {
    fn path(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.prefix, key)
        }
    }

    fn repair(&mut self, key: &str, detail: impl Into<String>) {
        let path = self.path(key);
        self.repairs.push(SchemaRepair::new(path, detail));
    }

    /// Missing or null keys fall back silently; malformed ones are repaired.
    fn field<T: DeserializeOwned>(&mut self, obj: &Map<String, Value>, key: &str, default: T) -> T {
        match obj.get(key) {
            None | Some(Value::Null) => default,
            Some(raw) => match serde_json::from_value(raw.clone()) {
                Ok(v) => v,
                Err(e) => {
                    self.repair(key, format!("reset to default: {e}"));
                    default
                }
            },
        }
    }

    /// Parse a list element by element, dropping the elements that fail.
    fn list<T: DeserializeOwned>(&mut self, obj: &Map<String, Value>, key: &str) -> Vec<T> {
        match obj.get(key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                let mut dropped = 0usize;
                for item in items {
                    match serde_json::from_value(item.clone()) {
                        Ok(v) => out.push(v),
                        Err(_) => dropped += 1,
                    }
                }
                if dropped > 0 {
                    self.repair(key, format!("dropped {dropped} malformed entries"));
                }
                out
            }
            Some(_) => {
                self.repair(key, "expected a list");
                Vec::new()
            }
        }
    }

    fn text(&mut self, obj: &Map<String, Value>, key: &str) -> Option<String> {
        match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(_) => {
                self.repair(key, "expected a string");
                None
            }
        }
    }
}

impl Agent {
    /// Load an agent record, repairing anything malformed.
    ///
    /// Only a record that is not a JSON object is rejected.
    pub fn from_value(raw: &Value, now: DateTime<Utc>) -> Result<Normalized<Agent>, EngineError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| EngineError::InvalidRecord("agent record is not an object".into()))?;
        let mut repairs = Vec::new();
        let agent = load_agent(obj, now, "", &mut repairs);
        Ok(Normalized {
            value: agent,
            repairs,
        })
    }
}

fn load_agent(
    obj: &Map<String, Value>,
    now: DateTime<Utc>,
    prefix: &str,
    repairs: &mut Vec<SchemaRepair>,
) -> Agent {
    let mut l = Loader {
        prefix: prefix.to_string(),
        repairs,
    };

    let id = match l.text(obj, "id") {
        Some(id) => id,
        None => {
            l.repair("id", "missing id, generated a new one");
            new_agent_id()
        }
    };
    let bot_id = l
        .text(obj, "bot_id")
        .unwrap_or_else(|| bot_id_for(&id, &HashSet::new()));
    let name = sanitize_name(&l.text(obj, "name").unwrap_or_else(|| "Agent".into()));
    let emoji = l.text(obj, "emoji").unwrap_or_default();
    let category = l
        .text(obj, "category")
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let created_at = l.field::<Option<DateTime<Utc>>>(obj, "created_at", None);
    let strategy = l.field(obj, "strategy", Default::default());

    let portfolio = match obj.get("portfolio") {
        Some(Value::Object(p)) => {
            let mut pl = Loader {
                prefix: l.path("portfolio"),
                repairs: &mut *l.repairs,
            };
            load_portfolio(p, &mut pl)
        }
        None | Some(Value::Null) => Portfolio::default(),
        Some(_) => {
            l.repair("portfolio", "expected an object");
            Portfolio::default()
        }
    };

    let purchases: Vec<Receipt> = l.list(obj, "purchases");

    let mut events: Vec<AgentEvent> = l.list(obj, "events");
    events.truncate(AGENT_EVENTS_LIMIT);

    let mut approvals: Vec<Proposal> = l.list(obj, "approvals");
    approvals.truncate(APPROVALS_LIMIT);

    let mode = match obj.get("mode") {
        None | Some(Value::Null) => AutonomyMode::Assist,
        Some(Value::String(s)) => AutonomyMode::parse(s).unwrap_or_else(|| {
            l.repair("mode", format!("unknown mode {s:?}, using assist"));
            AutonomyMode::Assist
        }),
        Some(_) => {
            l.repair("mode", "expected a string, using assist");
            AutonomyMode::Assist
        }
    };

    let autonomy = l.field(obj, "autonomy", Default::default());

    let mut value_history: Vec<ValueSnapshot> = l.list(obj, "value_history");
    value_history.sort_by(|a, b| b.date.cmp(&a.date));
    value_history.dedup_by_key(|s| s.date);
    value_history.truncate(VALUE_HISTORY_LIMIT);
    if value_history.is_empty() {
        value_history.push(ValueSnapshot {
            date: now.date_naive(),
            value: portfolio.cash_usdc,
        });
    }

    let safety = l.field(obj, "safety", Default::default());
    let policy = l.field(obj, "policy", Default::default());

    let mut runs: Vec<RunReport> = l.list(obj, "runs");
    if runs.len() > RUNS_LIMIT {
        let overflow = runs.len() - RUNS_LIMIT;
        runs.drain(..overflow);
    }

    Agent {
        id,
        bot_id,
        name,
        emoji,
        category,
        created_at,
        strategy,
        portfolio,
        purchases,
        events,
        approvals,
        mode,
        autonomy,
        value_history,
        safety,
        policy,
        runs,
    }
}

fn load_portfolio(p: &Map<String, Value>, l: &mut Loader<'_>) -> Portfolio {
    let mut cash_usdc = l.field(p, "cash_usdc", DEFAULT_STARTING_CASH);
    if cash_usdc < Decimal::ZERO {
        l.repair("cash_usdc", format!("negative cash {cash_usdc}, reset to 0"));
        cash_usdc = Decimal::ZERO;
    }

    let mut positions = BTreeMap::new();
    match p.get("positions") {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (asset, qty) in map {
                match serde_json::from_value::<Decimal>(qty.clone()) {
                    Ok(q) if q.abs() >= POSITION_EPSILON => {
                        positions.insert(asset.clone(), q);
                    }
                    Ok(_) => {}
                    Err(_) => l.repair("positions", format!("dropped malformed quantity for {asset}")),
                }
            }
        }
        Some(_) => l.repair("positions", "expected an object"),
    }

    let mut trades: Vec<TradeRecord> = l.list(p, "trades");
    trades.truncate(TRADE_LOG_LIMIT);

    Portfolio {
        cash_usdc,
        positions,
        trades,
    }
}

impl UserState {
    /// Load a user record with all agents normalized.
    ///
    /// Guarantees at least one agent, a valid active agent, unique agent
    /// ids and unique bot ids.
    pub fn from_value(
        raw: &Value,
        now: DateTime<Utc>,
    ) -> Result<Normalized<UserState>, EngineError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| EngineError::InvalidRecord("user record is not an object".into()))?;
        let mut repairs = Vec::new();

        let mut agents = Vec::new();
        match obj.get("agents") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    match item.as_object() {
                        Some(a) => {
                            agents.push(load_agent(a, now, &format!("agents[{i}]"), &mut repairs))
                        }
                        None => repairs.push(SchemaRepair::new(
                            format!("agents[{i}]"),
                            "dropped non-object agent",
                        )),
                    }
                }
            }
            Some(_) => repairs.push(SchemaRepair::new("agents", "expected a list")),
        }

        migrate_legacy_portfolio(obj, &mut agents, now, &mut repairs);

        if agents.is_empty() {
            repairs.push(SchemaRepair::new("agents", "no agents, created Core"));
            agents.push(Agent::new("Core", "", now, DEFAULT_STARTING_CASH));
        }

        let mut seen_ids = HashSet::new();
        for (i, agent) in agents.iter_mut().enumerate() {
            if !seen_ids.insert(agent.id.clone()) {
                repairs.push(SchemaRepair::new(
                    format!("agents[{i}].id"),
                    format!("duplicate id {}, generated a new one", agent.id),
                ));
                agent.id = new_agent_id();
                seen_ids.insert(agent.id.clone());
            }
        }

        // Keep the first holder of each bot id, regenerate the rest.
        let mut taken = HashSet::new();
        let mut regenerate = Vec::new();
        for (i, agent) in agents.iter().enumerate() {
            if !taken.insert(agent.bot_id.clone()) {
                regenerate.push(i);
            }
        }
        for i in regenerate {
            let fresh = bot_id_for(&agents[i].id, &taken);
            repairs.push(SchemaRepair::new(
                format!("agents[{i}].bot_id"),
                format!("duplicate bot id {}, reassigned {fresh}", agents[i].bot_id),
            ));
            taken.insert(fresh.clone());
            agents[i].bot_id = fresh;
        }

        let active = obj
            .get("active_agent_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let active_agent_id = if agents.iter().any(|a| a.id == active) {
            active.to_string()
        } else {
            if !active.is_empty() {
                repairs.push(SchemaRepair::new(
                    "active_agent_id",
                    format!("unknown agent {active}, using first"),
                ));
            }
            agents[0].id.clone()
        };

        let mut l = Loader {
            prefix: String::new(),
            repairs: &mut repairs,
        };
        let policy = l.field(obj, "policy", Default::default());
        let crowd_score = l
            .field(obj, "crowd_score", DEFAULT_CROWD_SCORE)
            .clamp(0.0, 100.0);
        let payments = l.field(obj, "payments", Default::default());

        Ok(Normalized {
            value: UserState {
                active_agent_id,
                agents,
                policy,
                crowd_score,
                payments,
            },
            repairs,
        })
    }
}

/// Older records kept one portfolio on the user. Move it into the first
/// agent when that agent has not traded yet.
fn migrate_legacy_portfolio(
    obj: &Map<String, Value>,
    agents: &mut Vec<Agent>,
    now: DateTime<Utc>,
    repairs: &mut Vec<SchemaRepair>,
) {
    let Some(Value::Object(legacy)) = obj.get("portfolio") else {
        return;
    };
    if agents.is_empty() {
        agents.push(Agent::new("Core", "", now, DEFAULT_STARTING_CASH));
    }
    let first = &mut agents[0];
    if !first.portfolio.trades.is_empty() {
        return;
    }
    let mut l = Loader {
        prefix: "portfolio".into(),
        repairs,
    };
    let migrated = load_portfolio(legacy, &mut l);
    if migrated.trades.is_empty() && migrated.positions.is_empty() {
        return;
    }
    first.value_history = vec![ValueSnapshot {
        date: now.date_naive(),
        value: migrated.cash_usdc,
    }];
    first.portfolio = migrated;
    repairs.push(SchemaRepair::new(
        "portfolio",
        format!("migrated legacy portfolio into agent {}", first.id),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
    }

    #[test]
    fn non_object_record_is_rejected() {
        let err = Agent::from_value(&json!([1, 2]), now()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord(_)));
    }

    #[test]
    fn unknown_mode_becomes_assist() {
        let raw = json!({"id": "abc", "name": "Alpha", "mode": "hyperdrive"});
        let loaded = Agent::from_value(&raw, now()).unwrap();
        assert_eq!(loaded.value.mode, AutonomyMode::Assist);
        assert!(loaded.repairs.iter().any(|r| r.path == "mode"));
    }

    #[test]
    fn well_formed_record_needs_no_repairs() {
        let raw = json!({
            "id": "abc",
            "bot_id": "BOT-0042",
            "name": "Alpha",
            "mode": "auto",
            "portfolio": {"cash_usdc": 250.5, "positions": {"bitcoin": 0.01}, "trades": []},
            "value_history": [{"date": "2026-10-18", "value": 250.5}]
        });
        let loaded = Agent::from_value(&raw, now()).unwrap();
        assert!(loaded.repairs.is_empty(), "{:?}", loaded.repairs);
        assert_eq!(loaded.value.bot_id, "BOT-0042");
        assert_eq!(loaded.value.portfolio.cash_usdc, dec!(250.5));
        assert_eq!(loaded.value.portfolio.position("bitcoin"), dec!(0.01));
    }

    #[test]
    fn history_is_sorted_newest_first_and_deduped() {
        let raw = json!({
            "id": "abc",
            "value_history": [
                {"date": "2026-10-17", "value": 900},
                {"date": "2026-10-19", "value": 1100},
                {"date": "2026-10-17", "value": 950},
                {"date": "bogus", "value": 1}
            ]
        });
        let loaded = Agent::from_value(&raw, now()).unwrap();
        let dates: Vec<_> = loaded.value.value_history.iter().map(|s| s.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
                NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
            ]
        );
        assert!(loaded.repairs.iter().any(|r| r.path == "value_history"));
    }

    #[test]
    fn malformed_positions_are_dropped() {
        let raw = json!({
            "id": "abc",
            "portfolio": {"cash_usdc": 10, "positions": {"bitcoin": "lots", "solana": 2, "dust": 0}}
        });
        let loaded = Agent::from_value(&raw, now()).unwrap();
        let positions = &loaded.value.portfolio.positions;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions.get("solana"), Some(&dec!(2)));
        assert!(loaded
            .repairs
            .iter()
            .any(|r| r.path == "portfolio.positions"));
    }

    #[test]
    fn user_without_agents_gets_core() {
        let loaded = UserState::from_value(&json!({}), now()).unwrap();
        let user = loaded.value;
        assert_eq!(user.agents.len(), 1);
        assert_eq!(user.agents[0].name, "Core");
        assert_eq!(user.active_agent_id, user.agents[0].id);
    }

    #[test]
    fn duplicate_bot_ids_are_reassigned() {
        let raw = json!({
            "active_agent_id": "missing",
            "agents": [
                {"id": "a1", "bot_id": "BOT-0001"},
                {"id": "a2", "bot_id": "BOT-0001"},
                {"id": "a3"}
            ]
        });
        let user = UserState::from_value(&raw, now()).unwrap().value;
        let ids: HashSet<_> = user.agents.iter().map(|a| a.bot_id.clone()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(user.agents[0].bot_id, "BOT-0001");
        assert_eq!(user.active_agent_id, "a1");
    }

    #[test]
    fn legacy_portfolio_moves_into_first_agent() {
        let raw = json!({
            "agents": [{"id": "a1"}],
            "portfolio": {"cash_usdc": 700, "positions": {"ethereum": 0.5}, "trades": []}
        });
        let user = UserState::from_value(&raw, now()).unwrap().value;
        assert_eq!(user.agents[0].portfolio.cash_usdc, dec!(700));
        assert_eq!(user.agents[0].portfolio.position("ethereum"), dec!(0.5));
    }

    #[test]
    fn negative_cash_is_clamped() {
        let raw = json!({"id": "abc", "portfolio": {"cash_usdc": -25.5}});
        let loaded = Agent::from_value(&raw, now()).unwrap();
        assert_eq!(loaded.value.portfolio.cash_usdc, Decimal::ZERO);
        assert!(loaded
            .repairs
            .iter()
            .any(|r| r.path == "portfolio.cash_usdc"));
    }

    #[test]
    fn bot_id_searches_whole_space() {
        let all: HashSet<String> = (0..10_000).map(|i| format!("BOT-{i:04}")).collect();

        let mut one_free = all.clone();
        one_free.remove("BOT-0007");
        assert_eq!(bot_id_for("agent-x", &one_free), "BOT-0007");

        let overflow = bot_id_for("agent-x", &all);
        assert!(!all.contains(&overflow));
        assert!(overflow.ends_with("-1"));
    }

    #[test]
    fn bot_id_probes_past_taken_ids() {
        let first = bot_id_for("agent-x", &HashSet::new());
        let mut taken = HashSet::new();
        taken.insert(first.clone());
        let second = bot_id_for("agent-x", &taken);
        assert_ne!(first, second);
        assert!(second.starts_with("BOT-"));
        assert_eq!(second.len(), 8);
    }
}
