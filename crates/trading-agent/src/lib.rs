//! Autonomous agent engine: trust gating, proposal drafting, the run
//! cycle, approvals and copy actions, plus configuration, persistence
//! and per-user sessions for the binary.

pub mod approvals;
pub mod autonomy;
pub mod config;
pub mod copying;
pub mod metrics;
pub mod payments;
pub mod proposal;
pub mod run_cycle;
pub mod session;
pub mod state_manager;
pub mod trust;

pub use approvals::{approve_proposal, propose_only, reject_proposal, Approval, Resolution};
pub use autonomy::{can_auto_execute, resolve_effective, AutoGate, TradeGate};
pub use config::EngineConfig;
pub use copying::{apply_copy, CopyOutcome};
pub use metrics::{agents_table, AgentMetrics, AgentRow};
pub use payments::{authorize_payment, PaymentDenial, PaymentLimits};
pub use proposal::ProposalGenerator;
pub use run_cycle::{run_cycle, CycleContext};
pub use session::{SessionRegistry, SessionState, UserSession};
pub use state_manager::{SessionStore, StateManager};
pub use trust::{assess, trust_signals};
