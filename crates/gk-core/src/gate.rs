//! Gates attached to `awaits` dependencies.
//!
//! A gate is the condition an `awaits` edge waits on. Timer and approval
//! gates are evaluated from their own fields; external and webhook gates only
//! flip when something calls back and marks them satisfied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::{Error, Result};

/// Gate metadata stored on an `awaits` edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "gate_type", rename_all = "snake_case")]
pub enum Gate {
    Timer {
        wait_until: DateTime<Utc>,
    },
    Approval {
        required_approvers: Vec<String>,
        /// Defaults to every required approver.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        approval_count: Option<usize>,
        #[serde(default)]
        current_approvers: Vec<String>,
    },
    External {
        external_system: String,
        external_id: String,
        #[serde(default)]
        satisfied: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        satisfied_at: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        satisfied_by: Option<String>,
    },
    Webhook {
        webhook_url: String,
        callback_id: String,
        #[serde(default)]
        satisfied: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        satisfied_at: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        satisfied_by: Option<String>,
    },
}

/// The kind of a gate, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Timer,
    Approval,
    External,
    Webhook,
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateKind::Timer => write!(f, "timer"),
            GateKind::Approval => write!(f, "approval"),
            GateKind::External => write!(f, "external"),
            GateKind::Webhook => write!(f, "webhook"),
        }
    }
}

/// Evaluation context for gates.
#[derive(Debug, Clone, Copy)]
pub struct GateContext {
    pub now: DateTime<Utc>,
}

impl GateContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Default for GateContext {
    fn default() -> Self {
        Self { now: Utc::now() }
    }
}

impl Gate {
    pub fn timer(wait_until: DateTime<Utc>) -> Self {
        Gate::Timer { wait_until }
    }

    pub fn approval(required_approvers: Vec<String>, approval_count: Option<usize>) -> Self {
        Gate::Approval {
            required_approvers,
            approval_count,
            current_approvers: Vec::new(),
        }
    }

    pub fn external(external_system: impl Into<String>, external_id: impl Into<String>) -> Self {
        Gate::External {
            external_system: external_system.into(),
            external_id: external_id.into(),
            satisfied: false,
            satisfied_at: None,
            satisfied_by: None,
        }
    }

    pub fn webhook(webhook_url: impl Into<String>, callback_id: impl Into<String>) -> Self {
        Gate::Webhook {
            webhook_url: webhook_url.into(),
            callback_id: callback_id.into(),
            satisfied: false,
            satisfied_at: None,
            satisfied_by: None,
        }
    }

    pub fn kind(&self) -> GateKind {
        match self {
            Gate::Timer { .. } => GateKind::Timer,
            Gate::Approval { .. } => GateKind::Approval,
            Gate::External { .. } => GateKind::External,
            Gate::Webhook { .. } => GateKind::Webhook,
        }
    }

    /// Decide whether the gate currently lets its edge through.
    pub fn is_satisfied(&self, ctx: &GateContext) -> bool {
        match self {
            Gate::Timer { wait_until } => ctx.now >= *wait_until,
            Gate::Approval { .. } => {
                self.valid_approval_count() >= self.required_approval_count()
            }
            Gate::External { satisfied, .. } | Gate::Webhook { satisfied, .. } => *satisfied,
        }
    }

    /// Number of distinct current approvers that are on the required list.
    /// Zero for non-approval gates.
    pub fn valid_approval_count(&self) -> usize {
        match self {
            Gate::Approval {
                required_approvers,
                current_approvers,
                ..
            } => current_approvers
                .iter()
                .filter(|approver| required_approvers.contains(approver))
                .collect::<HashSet<&String>>()
                .len(),
            _ => 0,
        }
    }

    /// Approvals needed before the gate opens. Zero for non-approval gates.
    pub fn required_approval_count(&self) -> usize {
        match self {
            Gate::Approval {
                required_approvers,
                approval_count,
                ..
            } => approval_count.unwrap_or(required_approvers.len()),
            _ => 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Gate::Timer { .. } => Ok(()),
            Gate::Approval {
                required_approvers,
                approval_count,
                ..
            } => match approval_count {
                Some(count) if *count > required_approvers.len() => {
                    Err(Error::SchemaValidation(format!(
                        "approval_count {} exceeds the {} required approvers",
                        count,
                        required_approvers.len()
                    )))
                }
                _ => Ok(()),
            },
            Gate::External {
                external_system,
                external_id,
                ..
            } => {
                if external_system.is_empty() || external_id.is_empty() {
                    return Err(Error::SchemaValidation(
                        "external gate requires external_system and external_id".to_string(),
                    ));
                }
                Ok(())
            }
            Gate::Webhook {
                webhook_url,
                callback_id,
                ..
            } => {
                if webhook_url.is_empty() || callback_id.is_empty() {
                    return Err(Error::SchemaValidation(
                        "webhook gate requires webhook_url and callback_id".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}
