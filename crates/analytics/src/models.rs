use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fixed look-back windows used for returns and leaderboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Window {
    pub const ALL: [Window; 4] = [Window::Daily, Window::Weekly, Window::Monthly, Window::Yearly];

    pub fn days(&self) -> i64 {
        match self {
            Window::Daily => 1,
            Window::Weekly => 7,
            Window::Monthly => 30,
            Window::Yearly => 365,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Window::Daily => "daily",
            Window::Weekly => "weekly",
            Window::Monthly => "monthly",
            Window::Yearly => "yearly",
        }
    }

    pub fn parse(raw: &str) -> Option<Window> {
        Window::ALL
            .into_iter()
            .find(|w| w.label().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowReturn {
    pub profit: Decimal,
    pub return_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowReturns {
    pub daily: WindowReturn,
    pub weekly: WindowReturn,
    pub monthly: WindowReturn,
    pub yearly: WindowReturn,
}

impl WindowReturns {
    pub fn get(&self, window: Window) -> WindowReturn {
        match window {
            Window::Daily => self.daily,
            Window::Weekly => self.weekly,
            Window::Monthly => self.monthly,
            Window::Yearly => self.yearly,
        }
    }
}

/// Who is looking at a leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Viewer {
    #[default]
    Human,
    Bot,
    Admin,
}

impl Viewer {
    /// Bots and admins see identities; humans only see bot ids.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Viewer::Bot | Viewer::Admin)
    }
}

/// Identity fields shown only to privileged viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub agent: String,
    pub value: Decimal,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub bot_id: String,
    pub score: Decimal,
    /// Window profit, already rounded to cents.
    pub profit: Decimal,
    pub streak: u32,
    #[serde(flatten)]
    pub identity: Option<AgentIdentity>,
}
