//! View state: navigation, modal flags and the banner.

use std::str::FromStr;

use serde::Serialize;

use crate::assist::AssistKind;
use crate::contracts::MintOutcome;
use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    #[default]
    Dashboard,
    HowItWorks,
    Identity,
    Research,
}

impl Page {
    pub const ALL: [Page; 4] = [Self::Dashboard, Self::HowItWorks, Self::Identity, Self::Research];

    pub fn slug(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::HowItWorks => "how-it-works",
            Self::Identity => "identity",
            Self::Research => "research",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Dashboard => "Dashboard",
            Self::HowItWorks => "How It Works",
            Self::Identity => "CARV ID",
            Self::Research => "AI Research",
        }
    }
}

impl FromStr for Page {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "dashboard" | "home" => Ok(Self::Dashboard),
            "how-it-works" | "how" | "about" => Ok(Self::HowItWorks),
            "identity" | "carv-id" | "id" => Ok(Self::Identity),
            "research" | "ai-agent" | "agent" => Ok(Self::Research),
            other => Err(format!(
                "unknown page '{other}' (expected one of: dashboard, how-it-works, identity, research)"
            )),
        }
    }
}

/// The most recent outcome. Setting either half clears the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Banner {
    pub message: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl Banner {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn failure(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            message: None,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.error.is_none()
    }
}

/// Open/closed flag per assist modal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modals {
    open: [bool; 3],
}

impl Modals {
    fn slot(kind: AssistKind) -> usize {
        match kind {
            AssistKind::Summary => 0,
            AssistKind::NextSteps => 1,
            AssistKind::ExplainTerm => 2,
        }
    }

    pub fn open(&mut self, kind: AssistKind) {
        self.open[Self::slot(kind)] = true;
    }

    pub fn close(&mut self, kind: AssistKind) {
        self.open[Self::slot(kind)] = false;
    }

    pub fn is_open(&self, kind: AssistKind) -> bool {
        self.open[Self::slot(kind)]
    }

    pub fn open_kinds(&self) -> Vec<AssistKind> {
        AssistKind::ALL
            .into_iter()
            .filter(|kind| self.is_open(*kind))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub page: Page,
    pub modals: Modals,
    pub banner: Banner,
    pub svm_agent_active: bool,
    /// Bumped on every toggle so a delayed follow-up can tell it is stale.
    pub svm_generation: u64,
    pub last_mint: Option<MintOutcome>,
}
