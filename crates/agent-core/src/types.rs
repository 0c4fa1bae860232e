use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::{AgentEvent, EngineError, Severity};

/// Quantities with smaller magnitude are treated as zero and pruned.
pub const POSITION_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 12);

pub const TRADE_LOG_LIMIT: usize = 200;
pub const VALUE_HISTORY_LIMIT: usize = 450;
pub const APPROVALS_LIMIT: usize = 50;
pub const RUNS_LIMIT: usize = 250;

pub const DEFAULT_STARTING_CASH: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);
pub const DEFAULT_CROWD_SCORE: f64 = 50.0;
pub const DEFAULT_RISK: f64 = 25.0;
pub const DEFAULT_CATEGORY: &str = "general";

// ---------------------------------------------------------------------------
// Autonomy
// ---------------------------------------------------------------------------

/// Autonomy ladder, shared by the requested and the effective level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyMode {
    Off,
    #[default]
    Assist,
    Auto,
    AutoPlus,
}

impl AutonomyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyMode::Off => "off",
            AutonomyMode::Assist => "assist",
            AutonomyMode::Auto => "auto",
            AutonomyMode::AutoPlus => "auto_plus",
        }
    }

    /// Parse a stored mode string; unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" => Some(AutonomyMode::Off),
            "assist" => Some(AutonomyMode::Assist),
            "auto" => Some(AutonomyMode::Auto),
            "auto_plus" => Some(AutonomyMode::AutoPlus),
            _ => None,
        }
    }

    /// True for the levels allowed to execute without approval.
    pub fn can_auto_execute(&self) -> bool {
        matches!(self, AutonomyMode::Auto | AutonomyMode::AutoPlus)
    }
}

impl fmt::Display for AutonomyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hard caps for auto-executed practice trades.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCaps {
    pub max_trades_per_day: u32,
    pub max_notional_usdc: Decimal,
}

impl ExecutionCaps {
    pub const AUTO: ExecutionCaps = ExecutionCaps {
        max_trades_per_day: 2,
        max_notional_usdc: Decimal::from_parts(10, 0, 0, false, 0),
    };
    pub const AUTO_PLUS: ExecutionCaps = ExecutionCaps {
        max_trades_per_day: 6,
        max_notional_usdc: Decimal::from_parts(40, 0, 0, false, 0),
    };
}

/// Trust requirements for unlocking `auto_plus`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnlockThresholds {
    pub min_verified_receipts: u32,
    pub min_crowd_score: f64,
    pub max_deviation_pct: f64,
}

impl Default for UnlockThresholds {
    fn default() -> Self {
        Self {
            min_verified_receipts: 1,
            min_crowd_score: 55.0,
            max_deviation_pct: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomySettings {
    pub auto: ExecutionCaps,
    pub auto_plus: ExecutionCaps,
    pub unlock_auto_plus: UnlockThresholds,
}

impl Default for AutonomySettings {
    fn default() -> Self {
        Self {
            auto: ExecutionCaps::AUTO,
            auto_plus: ExecutionCaps::AUTO_PLUS,
            unlock_auto_plus: UnlockThresholds::default(),
        }
    }
}

impl AutonomySettings {
    /// Caps for an effective level; `None` for levels that never auto-execute.
    pub fn caps_for(&self, effective: AutonomyMode) -> Option<ExecutionCaps> {
        match effective {
            AutonomyMode::Auto => Some(self.auto),
            AutonomyMode::AutoPlus => Some(self.auto_plus),
            AutonomyMode::Off | AutonomyMode::Assist => None,
        }
    }
}

/// Read-only bundle of signals used to gate autonomy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustSignals {
    pub crowd_score: f64,
    pub verified_receipts: u32,
    pub deviation_pct: f64,
    pub safety_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomyResolution {
    pub requested: AutonomyMode,
    pub effective: AutonomyMode,
    pub note: String,
}

// ---------------------------------------------------------------------------
// Safety
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyExit {
    pub ts: DateTime<Utc>,
    pub reason: String,
    pub value_at_exit: Decimal,
    pub assets_sold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyState {
    pub enabled: bool,
    pub fraud_alert: bool,
    pub panic: bool,
    pub max_daily_loss_usdc: Decimal,
    pub max_drawdown_pct: f64,
    pub peak_value: Option<Decimal>,
    pub last_exit: Option<SafetyExit>,
}

impl Default for SafetyState {
    fn default() -> Self {
        Self {
            enabled: true,
            fraud_alert: false,
            panic: false,
            max_daily_loss_usdc: dec!(50),
            max_drawdown_pct: 25.0,
            peak_value: None,
            last_exit: None,
        }
    }
}

impl SafetyState {
    /// Enabled, no fraud alert, no panic.
    pub fn is_ok(&self) -> bool {
        self.enabled && !self.fraud_alert && !self.panic
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// User-level behavioral policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Riskness, 0-100.
    pub risk: f64,
    pub max_per_tx_usdc: Decimal,
    pub daily_cap_usdc: Decimal,
    pub cooldown_s: u64,
    pub max_deviation_pct: f64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            risk: DEFAULT_RISK,
            max_per_tx_usdc: dec!(0.10),
            daily_cap_usdc: dec!(0.50),
            cooldown_s: 15,
            max_deviation_pct: 20.0,
        }
    }
}

/// Per-agent overrides; unset fields fall back to the user policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_per_tx_usdc: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_cap_usdc: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_s: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_deviation_pct: Option<f64>,
}

impl Policy {
    pub fn with_overrides(&self, o: &PolicyOverrides) -> Policy {
        Policy {
            risk: o.risk.unwrap_or(self.risk).clamp(0.0, 100.0),
            max_per_tx_usdc: o.max_per_tx_usdc.unwrap_or(self.max_per_tx_usdc),
            daily_cap_usdc: o.daily_cap_usdc.unwrap_or(self.daily_cap_usdc),
            cooldown_s: o.cooldown_s.unwrap_or(self.cooldown_s),
            max_deviation_pct: o.max_deviation_pct.unwrap_or(self.max_deviation_pct),
        }
    }
}

/// Running payment totals for the payment policy. One day at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentLedger {
    pub day: Option<NaiveDate>,
    pub total_usdc: Decimal,
    pub last_at: Option<DateTime<Utc>>,
}

impl PaymentLedger {
    /// Amount authorized on `date`.
    pub fn total_on(&self, date: NaiveDate) -> Decimal {
        if self.day == Some(date) {
            self.total_usdc
        } else {
            Decimal::ZERO
        }
    }

    pub fn commit(&mut self, amount: Decimal, now: DateTime<Utc>) {
        let today = now.date_naive();
        self.total_usdc = self.total_on(today) + amount;
        self.day = Some(today);
        self.last_at = Some(now);
    }
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executed practice trade. Legacy records may lack a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    pub side: TradeSide,
    pub asset: String,
    pub qty: Decimal,
    pub price: Decimal,
    /// Cash leg (notional) of the trade.
    pub cash: Decimal,
    /// Bot id of the agent this trade was mirrored from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Portfolio {
    pub cash_usdc: Decimal,
    pub positions: BTreeMap<String, Decimal>,
    /// Newest first, bounded at [`TRADE_LOG_LIMIT`].
    pub trades: Vec<TradeRecord>,
}

impl Default for Portfolio {
    fn default() -> Self {
        Self::with_cash(DEFAULT_STARTING_CASH)
    }
}

impl Portfolio {
    pub fn with_cash(cash_usdc: Decimal) -> Self {
        Self {
            cash_usdc,
            positions: BTreeMap::new(),
            trades: Vec::new(),
        }
    }

    pub fn position(&self, asset: &str) -> Decimal {
        self.positions.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Drop positions whose magnitude is below [`POSITION_EPSILON`].
    pub fn prune_dust(&mut self) {
        self.positions.retain(|_, q| q.abs() >= POSITION_EPSILON);
    }

    pub fn push_trade(&mut self, trade: TradeRecord) {
        self.trades.insert(0, trade);
        self.trades.truncate(TRADE_LOG_LIMIT);
    }
}

/// End-of-day portfolio value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueSnapshot {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// Purchase receipt recorded by the payment flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub amount_usdc: Option<Decimal>,
}

impl Receipt {
    pub fn is_verified(&self) -> bool {
        matches!(
            self.status.trim().to_ascii_lowercase().as_str(),
            "verified" | "success" | "confirmed"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyProfile {
    pub name: String,
    pub params: BTreeMap<String, serde_json::Value>,
    pub copied_from: Option<String>,
}

impl Default for StrategyProfile {
    fn default() -> Self {
        let mut params = BTreeMap::new();
        params.insert("horizon".to_string(), serde_json::Value::from("7d"));
        Self {
            name: "Balanced".to_string(),
            params,
            copied_from: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyMode {
    MirrorTrades,
    CopySettings,
    CopyStrategy,
}

impl CopyMode {
    pub fn label(&self) -> &'static str {
        match self {
            CopyMode::MirrorTrades => "mirror trades",
            CopyMode::CopySettings => "copy settings",
            CopyMode::CopyStrategy => "copy strategy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    Trade,
    Payment,
    Copy,
}

impl ProposalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalKind::Trade => "trade",
            ProposalKind::Payment => "payment",
            ProposalKind::Copy => "copy",
        }
    }
}

/// Type-specific payload of a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposalAction {
    Trade {
        asset: String,
        side: TradeSide,
        qty: Decimal,
    },
    Payment {
        amount_usdc: Decimal,
        to: String,
    },
    Copy {
        mode: CopyMode,
        source_agent_id: Option<String>,
    },
}

impl ProposalAction {
    pub fn kind(&self) -> ProposalKind {
        match self {
            ProposalAction::Trade { .. } => ProposalKind::Trade,
            ProposalAction::Payment { .. } => ProposalKind::Payment,
            ProposalAction::Copy { .. } => ProposalKind::Copy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Executed,
}

/// Deviation constraint captured when a proposal is drafted. Never recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationConstraint {
    pub deviation_pct: f64,
    pub max_deviation_pct: f64,
}

impl DeviationConstraint {
    pub fn holds(&self) -> bool {
        self.deviation_pct <= self.max_deviation_pct
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub agent_id: String,
    pub title: String,
    pub action: ProposalAction,
    #[serde(default)]
    pub status: ProposalStatus,
    pub constraints: DeviationConstraint,
}

impl Proposal {
    pub fn kind(&self) -> ProposalKind {
        self.action.kind()
    }
}

// ---------------------------------------------------------------------------
// Run reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Executed,
    Queued,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub status: DecisionStatus,
    pub reason: String,
}

impl Decision {
    pub fn executed(reason: impl Into<String>) -> Self {
        Self {
            status: DecisionStatus::Executed,
            reason: reason.into(),
        }
    }

    pub fn queued(reason: impl Into<String>) -> Self {
        Self {
            status: DecisionStatus::Queued,
            reason: reason.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: DecisionStatus::Skipped,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalSummary {
    pub id: String,
    pub kind: ProposalKind,
    pub title: String,
}

impl From<&Proposal> for ProposalSummary {
    fn from(p: &Proposal) -> Self {
        Self {
            id: p.id.clone(),
            kind: p.kind(),
            title: p.title.clone(),
        }
    }
}

/// Inputs evaluated by the auto-execution gate for a trade proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeGateInputs {
    pub price: Decimal,
    pub notional_usdc: Decimal,
    pub trades_today: u32,
    pub caps: Option<ExecutionCaps>,
    pub constraints: DeviationConstraint,
}

/// Immutable record of one run cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub reason: String,
    pub agent_id: String,
    pub autonomy: AutonomyResolution,
    pub signals: TrustSignals,
    pub proposal: Option<ProposalSummary>,
    pub trade_gate: Option<TradeGateInputs>,
    pub decision: Decision,
    pub value_after: Decimal,
    pub safety_exit: Option<SafetyExit>,
}

impl RunReport {
    pub fn executed(&self) -> bool {
        self.decision.status == DecisionStatus::Executed
    }

    pub fn queued(&self) -> bool {
        self.decision.status == DecisionStatus::Queued
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// An independent simulated trading identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    /// Anonymized identity, unique within one user's agents.
    pub bot_id: String,
    pub name: String,
    #[serde(default)]
    pub emoji: String,
    pub category: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub strategy: StrategyProfile,
    #[serde(default)]
    pub portfolio: Portfolio,
    #[serde(default)]
    pub purchases: Vec<Receipt>,
    /// Newest first.
    #[serde(default)]
    pub events: Vec<AgentEvent>,
    /// Pending proposals, newest first.
    #[serde(default)]
    pub approvals: Vec<Proposal>,
    /// Requested autonomy level.
    #[serde(default)]
    pub mode: AutonomyMode,
    #[serde(default)]
    pub autonomy: AutonomySettings,
    /// Newest first, one entry per date.
    #[serde(default)]
    pub value_history: Vec<ValueSnapshot>,
    #[serde(default)]
    pub safety: SafetyState,
    #[serde(default)]
    pub policy: PolicyOverrides,
    /// Oldest first; the last element is the most recent run.
    #[serde(default)]
    pub runs: Vec<RunReport>,
}

impl Agent {
    /// Fresh agent with its own portfolio and an opening snapshot.
    pub fn new(name: &str, emoji: &str, now: DateTime<Utc>, starting_cash: Decimal) -> Self {
        let id = new_agent_id();
        let bot_id = crate::normalize::bot_id_for(&id, &HashSet::new());
        Self {
            id,
            bot_id,
            name: sanitize_name(name),
            emoji: emoji.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            created_at: Some(now),
            strategy: StrategyProfile::default(),
            portfolio: Portfolio::with_cash(starting_cash),
            purchases: Vec::new(),
            events: Vec::new(),
            approvals: Vec::new(),
            mode: AutonomyMode::Assist,
            autonomy: AutonomySettings::default(),
            value_history: vec![ValueSnapshot {
                date: now.date_naive(),
                value: starting_cash,
            }],
            safety: SafetyState::default(),
            policy: PolicyOverrides::default(),
            runs: Vec::new(),
        }
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.emoji, self.name).trim().to_string()
    }

    pub fn push_event(&mut self, event: AgentEvent) {
        self.events.insert(0, event);
        self.events.truncate(crate::AGENT_EVENTS_LIMIT);
    }

    pub fn enqueue_approval(&mut self, proposal: Proposal) {
        self.approvals.insert(0, proposal);
        self.approvals.truncate(APPROVALS_LIMIT);
    }

    /// Remove a queued proposal by id.
    pub fn take_approval(&mut self, proposal_id: &str) -> Option<Proposal> {
        let idx = self.approvals.iter().position(|p| p.id == proposal_id)?;
        Some(self.approvals.remove(idx))
    }

    pub fn pending_approvals(&self) -> impl Iterator<Item = &Proposal> {
        self.approvals
            .iter()
            .filter(|p| p.status == ProposalStatus::Pending)
    }

    pub fn push_run(&mut self, report: RunReport) {
        self.runs.push(report);
        if self.runs.len() > RUNS_LIMIT {
            let overflow = self.runs.len() - RUNS_LIMIT;
            self.runs.drain(..overflow);
        }
    }

    pub fn last_run(&self) -> Option<&RunReport> {
        self.runs.last()
    }

    pub fn verified_receipts(&self) -> u32 {
        self.purchases.iter().filter(|r| r.is_verified()).count() as u32
    }
}

/// All of one user's agents plus the user-level policy and crowd score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub active_agent_id: String,
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default = "default_crowd_score")]
    pub crowd_score: f64,
    #[serde(default)]
    pub payments: PaymentLedger,
}

fn default_crowd_score() -> f64 {
    DEFAULT_CROWD_SCORE
}

impl UserState {
    /// A user with a single starter agent.
    pub fn new(now: DateTime<Utc>, starting_cash: Decimal) -> Self {
        let agent = Agent::new("Core", "", now, starting_cash);
        Self {
            active_agent_id: agent.id.clone(),
            agents: vec![agent],
            policy: Policy::default(),
            crowd_score: DEFAULT_CROWD_SCORE,
            payments: PaymentLedger::default(),
        }
    }

    pub fn agent(&self, agent_id: &str) -> Result<&Agent, EngineError> {
        self.agents
            .iter()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| EngineError::UnknownAgent(agent_id.to_string()))
    }

    pub fn agent_mut(&mut self, agent_id: &str) -> Result<&mut Agent, EngineError> {
        self.agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| EngineError::UnknownAgent(agent_id.to_string()))
    }

    pub fn agent_index(&self, agent_id: &str) -> Result<usize, EngineError> {
        self.agents
            .iter()
            .position(|a| a.id == agent_id)
            .ok_or_else(|| EngineError::UnknownAgent(agent_id.to_string()))
    }

    /// Effective policy for one agent (user policy + agent overrides).
    pub fn policy_for(&self, agent: &Agent) -> Policy {
        self.policy.with_overrides(&agent.policy)
    }

    /// Create an agent, make it active, and return its id.
    pub fn create_agent(
        &mut self,
        name: &str,
        emoji: &str,
        now: DateTime<Utc>,
        starting_cash: Decimal,
    ) -> String {
        let mut agent = Agent::new(name, emoji, now, starting_cash);
        let taken: HashSet<String> = self.agents.iter().map(|a| a.bot_id.clone()).collect();
        agent.bot_id = crate::normalize::bot_id_for(&agent.id, &taken);
        let label = agent.label();
        agent.push_event(AgentEvent::new(now, "agent", "Created agent", &label, Severity::Success));
        let id = agent.id.clone();
        self.agents.insert(0, agent);
        self.active_agent_id = id.clone();
        id
    }

    /// Delete an agent. The user always keeps at least one agent.
    pub fn delete_agent(
        &mut self,
        agent_id: &str,
        now: DateTime<Utc>,
        starting_cash: Decimal,
    ) -> Result<(), EngineError> {
        let idx = self.agent_index(agent_id)?;
        self.agents.remove(idx);
        if self.agents.is_empty() {
            self.agents.push(Agent::new("Core", "", now, starting_cash));
        }
        if self.active_agent_id == agent_id {
            self.active_agent_id = self.agents[0].id.clone();
        }
        Ok(())
    }

    pub fn set_active_agent(&mut self, agent_id: &str) -> Result<(), EngineError> {
        self.agent_index(agent_id)?;
        self.active_agent_id = agent_id.to_string();
        Ok(())
    }

    pub fn active_agent(&self) -> Option<&Agent> {
        self.agents
            .iter()
            .find(|a| a.id == self.active_agent_id)
            .or_else(|| self.agents.first())
    }
}

pub(crate) fn new_agent_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Letters, digits, spaces, `_` and `-`; collapsed whitespace; at most 24 chars.
pub fn sanitize_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned: String = collapsed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .take(24)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "Agent".to_string()
    } else {
        cleaned.to_string()
    }
}
