//! Per-action in-flight guard.
//!
//! At most one call per [`ContractAction`] runs at a time. A second call is
//! refused rather than queued; the permit releases the slot on drop, so an
//! early `?` return or a panic cannot wedge the action.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractAction {
    Mint,
    GrantAccess,
    RevokeAccess,
    SubmitResult,
}

impl ContractAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mint => "mint",
            Self::GrantAccess => "grant_access",
            Self::RevokeAccess => "revoke_access",
            Self::SubmitResult => "submit_result",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<ContractAction>>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `action`, or `None` if a call is already pending.
    pub fn try_acquire(&self, action: ContractAction) -> Option<InFlightPermit> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(action) {
            return None;
        }
        Some(InFlightPermit {
            action,
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, action: ContractAction) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&action)
    }
}

#[derive(Debug)]
pub struct InFlightPermit {
    action: ContractAction,
    active: Arc<Mutex<HashSet<ContractAction>>>,
}

impl InFlightPermit {
    pub fn action(&self) -> ContractAction {
        self.action
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.action);
    }
}
