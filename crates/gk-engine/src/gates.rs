//! Gate satisfaction manager
//!
//! Mutates gate metadata on `awaits` edges and re-evaluates the waiting
//! element when the gate opens or closes. Domain failures (missing edge,
//! wrong gate kind, unlisted approver) come back as values; only store
//! failures are errors.

use chrono::Utc;
use gk_core::{DependencyKind, Gate, GateContext};
use gk_storage::{ElementStore, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::engine::BlockingEngine;

/// Result of [`BlockingEngine::record_approval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub success: bool,
    pub current_count: usize,
    pub required_count: usize,
    pub satisfied: bool,
}

impl ApprovalOutcome {
    fn rejected(gate: Option<&Gate>) -> Self {
        let ctx = GateContext::default();
        Self {
            success: false,
            current_count: gate.map(Gate::valid_approval_count).unwrap_or(0),
            required_count: gate.map(Gate::required_approval_count).unwrap_or(0),
            satisfied: gate.is_some_and(|g| g.is_satisfied(&ctx)),
        }
    }
}

/// Result of [`BlockingEngine::remove_approval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApprovalRemoval {
    pub success: bool,
    pub current_count: usize,
    pub satisfied: bool,
}

impl<S: ElementStore> BlockingEngine<S> {
    async fn load_gate(&self, source_id: &str, target_id: &str) -> Result<Option<Gate>> {
        Ok(self
            .store()
            .get_dependency(source_id, target_id, DependencyKind::Awaits)
            .await?
            .and_then(|dep| dep.gate))
    }

    /// Mark an external or webhook gate satisfied by `actor`.
    ///
    /// Returns false if there is no such `awaits` edge or its gate is a
    /// timer or approval gate. Satisfying an already satisfied gate returns
    /// true without touching it.
    #[instrument(skip(self))]
    pub async fn satisfy_gate(
        &mut self,
        source_id: &str,
        target_id: &str,
        actor: &str,
    ) -> Result<bool> {
        let Some(mut gate) = self.load_gate(source_id, target_id).await? else {
            debug!("no awaits gate to satisfy");
            return Ok(false);
        };

        let kind = gate.kind();
        match &mut gate {
            Gate::External {
                satisfied,
                satisfied_at,
                satisfied_by,
                ..
            }
            | Gate::Webhook {
                satisfied,
                satisfied_at,
                satisfied_by,
                ..
            } => {
                if *satisfied {
                    return Ok(true);
                }
                *satisfied = true;
                *satisfied_at = Some(Utc::now());
                *satisfied_by = Some(actor.to_string());
            }
            Gate::Timer { .. } | Gate::Approval { .. } => {
                warn!(%kind, "gate cannot be satisfied explicitly");
                return Ok(false);
            }
        }

        self.store().update_gate(source_id, target_id, &gate).await?;
        self.refresh(source_id).await?;

        info!(%kind, "gate satisfied");
        Ok(true)
    }

    /// Record `approver` on an approval gate.
    ///
    /// Approvers not on the required list are rejected and nothing is
    /// written. Recording the same approver twice is a no-op.
    #[instrument(skip(self))]
    pub async fn record_approval(
        &mut self,
        source_id: &str,
        target_id: &str,
        approver: &str,
    ) -> Result<ApprovalOutcome> {
        let gate = self.load_gate(source_id, target_id).await?;
        let Some(mut gate @ Gate::Approval { .. }) = gate else {
            debug!("no approval gate on edge");
            return Ok(ApprovalOutcome::rejected(None));
        };

        let ctx = GateContext::default();
        let was_satisfied = gate.is_satisfied(&ctx);

        if let Gate::Approval {
            required_approvers,
            current_approvers,
            ..
        } = &mut gate
        {
            if !required_approvers.iter().any(|a| a == approver) {
                warn!("approver is not on the required list");
                return Ok(ApprovalOutcome::rejected(Some(&gate)));
            }
            if !current_approvers.iter().any(|a| a == approver) {
                current_approvers.push(approver.to_string());
                self.store().update_gate(source_id, target_id, &gate).await?;
            }
        }

        let satisfied = gate.is_satisfied(&ctx);
        if satisfied && !was_satisfied {
            info!("approval gate satisfied");
            self.refresh(source_id).await?;
        }

        Ok(ApprovalOutcome {
            success: true,
            current_count: gate.valid_approval_count(),
            required_count: gate.required_approval_count(),
            satisfied,
        })
    }

    /// Withdraw `approver` from an approval gate. Withdrawing an approver
    /// who never approved succeeds without changes.
    #[instrument(skip(self))]
    pub async fn remove_approval(
        &mut self,
        source_id: &str,
        target_id: &str,
        approver: &str,
    ) -> Result<ApprovalRemoval> {
        let gate = self.load_gate(source_id, target_id).await?;
        let Some(mut gate @ Gate::Approval { .. }) = gate else {
            debug!("no approval gate on edge");
            return Ok(ApprovalRemoval {
                success: false,
                current_count: 0,
                satisfied: false,
            });
        };

        let ctx = GateContext::default();
        let was_satisfied = gate.is_satisfied(&ctx);

        if let Gate::Approval {
            current_approvers, ..
        } = &mut gate
        {
            if let Some(pos) = current_approvers.iter().position(|a| a == approver) {
                current_approvers.remove(pos);
                self.store().update_gate(source_id, target_id, &gate).await?;
            }
        }

        let satisfied = gate.is_satisfied(&ctx);
        if was_satisfied && !satisfied {
            info!("approval gate no longer satisfied");
            self.refresh(source_id).await?;
        }

        Ok(ApprovalRemoval {
            success: true,
            current_count: gate.valid_approval_count(),
            satisfied,
        })
    }
}
