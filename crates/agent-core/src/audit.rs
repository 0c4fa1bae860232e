use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AuditSink;

pub const AUDIT_LOG_LIMIT: usize = 500;
pub const AGENT_EVENTS_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Proposal,
    AutoExec,
    Approve,
    Reject,
    Copy,
    SafetyExit,
}

/// One row of the trustless audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: DateTime<Utc>,
    pub kind: AuditKind,
    pub severity: Severity,
    pub message: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        ts: DateTime<Utc>,
        kind: AuditKind,
        agent_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ts,
            kind,
            severity: Severity::Info,
            message: message.into(),
            agent_id: agent_id.into(),
            proposal_id: None,
            meta: None,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn proposal(mut self, proposal_id: impl Into<String>) -> Self {
        self.proposal_id = Some(proposal_id.into());
        self
    }

    pub fn meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// In-memory audit log, newest first, bounded at [`AUDIT_LOG_LIMIT`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_agent<'a>(&'a self, agent_id: &'a str) -> impl Iterator<Item = &'a AuditEntry> {
        self.entries.iter().filter(move |e| e.agent_id == agent_id)
    }

    pub fn for_proposal<'a>(
        &'a self,
        proposal_id: &'a str,
    ) -> impl Iterator<Item = &'a AuditEntry> {
        self.entries
            .iter()
            .filter(move |e| e.proposal_id.as_deref() == Some(proposal_id))
    }
}

impl AuditSink for AuditLog {
    fn record(&mut self, entry: AuditEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(AUDIT_LOG_LIMIT);
    }
}

/// Timeline entry shown on an agent's activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub ts: DateTime<Utc>,
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub severity: Severity,
}

impl AgentEvent {
    pub fn new(
        ts: DateTime<Utc>,
        kind: &str,
        title: &str,
        details: &str,
        severity: Severity,
    ) -> Self {
        Self {
            ts,
            kind: truncate_chars(kind, 40),
            title: truncate_chars(title, 140),
            details: truncate_chars(details, 500),
            severity,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
