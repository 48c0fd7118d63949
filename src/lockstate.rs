//! Publish / edit-approval lifecycle of a mark sheet.

use crate::calc::CalcError;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    /// Published; no edit request outstanding.
    Locked,
    LockedPendingApproval,
    LockedApproved,
    LockedRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    Publish,
    RequestEdit,
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EditRequestStatus {
    None,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFlags {
    pub state: &'static str,
    pub locked: bool,
    pub can_edit: bool,
    pub edit_request_status: EditRequestStatus,
}

impl LockState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unlocked => "unlocked",
            Self::Locked => "locked",
            Self::LockedPendingApproval => "locked_pending_approval",
            Self::LockedApproved => "locked_approved",
            Self::LockedRejected => "locked_rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unlocked" => Some(Self::Unlocked),
            "locked" => Some(Self::Locked),
            "locked_pending_approval" => Some(Self::LockedPendingApproval),
            "locked_approved" => Some(Self::LockedApproved),
            "locked_rejected" => Some(Self::LockedRejected),
            _ => None,
        }
    }

    pub fn apply(self, event: LockEvent) -> Result<Self, CalcError> {
        use LockEvent::*;
        use LockState::*;
        let next = match (self, event) {
            (Unlocked, Publish) | (LockedApproved, Publish) => Some(Locked),
            (Locked, RequestEdit) | (LockedRejected, RequestEdit) => Some(LockedPendingApproval),
            (LockedPendingApproval, Approve) => Some(LockedApproved),
            (LockedPendingApproval, Reject) => Some(LockedRejected),
            _ => None,
        };
        next.ok_or_else(|| {
            CalcError::new("invalid_transition", "transition not allowed from current state")
                .with_details(json!({
                    "state": self.as_str(),
                    "event": event.as_str(),
                }))
        })
    }

    pub fn can_edit(self) -> bool {
        matches!(self, Self::Unlocked | Self::LockedApproved)
    }

    pub fn flags(self) -> LockFlags {
        LockFlags {
            state: self.as_str(),
            locked: self != Self::Unlocked,
            can_edit: self.can_edit(),
            edit_request_status: match self {
                Self::Unlocked | Self::Locked => EditRequestStatus::None,
                Self::LockedPendingApproval => EditRequestStatus::Pending,
                Self::LockedApproved => EditRequestStatus::Approved,
                Self::LockedRejected => EditRequestStatus::Rejected,
            },
        }
    }
}

impl LockEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::RequestEdit => "requestEdit",
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}
