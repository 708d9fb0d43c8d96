//! Shipment workflow state machine.
//!
//! Every shipment carries the same eight ordered stages. Exactly one stage is
//! in progress until the last one completes; stages only move forward and a
//! completed stage is never reopened. Admins may block the active stage, which
//! freezes customer progress until it is unblocked.

use crate::types::{StageId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical stage codes, in workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCode {
    DeliveryRequest,
    AddressVerification,
    CompliancePaperwork,
    Packaging,
    CarrierAssignment,
    InTransit,
    OutForDelivery,
    DeliveryCompleted,
}

impl StageCode {
    pub const ALL: [StageCode; 8] = [
        StageCode::DeliveryRequest,
        StageCode::AddressVerification,
        StageCode::CompliancePaperwork,
        StageCode::Packaging,
        StageCode::CarrierAssignment,
        StageCode::InTransit,
        StageCode::OutForDelivery,
        StageCode::DeliveryCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageCode::DeliveryRequest => "delivery_request",
            StageCode::AddressVerification => "address_verification",
            StageCode::CompliancePaperwork => "compliance_paperwork",
            StageCode::Packaging => "packaging",
            StageCode::CarrierAssignment => "carrier_assignment",
            StageCode::InTransit => "in_transit",
            StageCode::OutForDelivery => "out_for_delivery",
            StageCode::DeliveryCompleted => "delivery_completed",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StageCode::DeliveryRequest => "Delivery Requested",
            StageCode::AddressVerification => "Address / Delivery Location Verification",
            StageCode::CompliancePaperwork => "Compliance & Paperwork",
            StageCode::Packaging => "Packaging & Vault Release",
            StageCode::CarrierAssignment => "Carrier Assignment",
            StageCode::InTransit => "In Transit",
            StageCode::OutForDelivery => "Out For Delivery",
            StageCode::DeliveryCompleted => "Delivered",
        }
    }

    // fixed at creation. only the verification and paperwork stages need the customer.
    pub fn requires_customer_action(&self) -> bool {
        matches!(self, StageCode::AddressVerification | StageCode::CompliancePaperwork)
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == code)
    }
}

impl fmt::Display for StageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub id: StageId,
    pub code: StageCode,
    pub name: String,
    pub stage_order: u32,
    pub status: StageStatus,
    pub requires_customer_action: bool,
    pub customer_action_completed: bool,
    pub customer_action_note: Option<String>,
    pub customer_action_completed_at: Option<Timestamp>,
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
    pub blocked_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl WorkflowStage {
    fn new(id: StageId, code: StageCode, stage_order: u32) -> Self {
        Self {
            id,
            code,
            name: code.display_name().to_string(),
            stage_order,
            status: if stage_order == 0 {
                StageStatus::InProgress
            } else {
                StageStatus::Pending
            },
            requires_customer_action: code.requires_customer_action(),
            customer_action_completed: false,
            customer_action_note: None,
            customer_action_completed_at: None,
            is_blocked: false,
            blocked_reason: None,
            blocked_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("No active workflow stage to update")]
    NoActiveStage,

    #[error("Stage '{0}' is blocked by admin and cannot be progressed")]
    StageBlocked(StageCode),

    #[error("Active stage '{0}' does not require customer action")]
    CustomerActionNotRequired(StageCode),

    #[error("action_note is required to complete this stage")]
    EmptyNote,

    #[error("Stage '{0}' not found on this shipment")]
    StageNotFound(StageCode),

    #[error("Stage '{0}' is already completed")]
    StageAlreadyCompleted(StageCode),

    #[error("Stage '{0}' is not blocked")]
    StageNotBlocked(StageCode),

    #[error("Workflow invariant violated: {0}")]
    Corrupt(String),
}

/// Outcome of completing the active stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageAdvance {
    pub completed: StageCode,
    pub activated: Option<StageCode>,
}

/// Build the eight canonical stages. `next_id` hands out stage ids in order.
pub fn initial_stages(mut next_id: impl FnMut() -> StageId) -> Vec<WorkflowStage> {
    StageCode::ALL
        .iter()
        .enumerate()
        .map(|(order, code)| WorkflowStage::new(next_id(), *code, order as u32))
        .collect()
}

pub fn active_stage(stages: &[WorkflowStage]) -> Option<&WorkflowStage> {
    stages
        .iter()
        .filter(|s| s.status == StageStatus::InProgress)
        .min_by_key(|s| s.stage_order)
}

fn active_index(stages: &[WorkflowStage]) -> Option<usize> {
    stages
        .iter()
        .enumerate()
        .filter(|(_, s)| s.status == StageStatus::InProgress)
        .min_by_key(|(_, s)| s.stage_order)
        .map(|(i, _)| i)
}

fn stage_index(stages: &[WorkflowStage], code: StageCode) -> Result<usize, WorkflowError> {
    stages
        .iter()
        .position(|s| s.code == code)
        .ok_or(WorkflowError::StageNotFound(code))
}

/// Customer completes the active stage with a note.
pub fn complete_customer_action(
    stages: &mut [WorkflowStage],
    note: &str,
    now: Timestamp,
) -> Result<StageAdvance, WorkflowError> {
    let idx = active_index(stages).ok_or(WorkflowError::NoActiveStage)?;
    let stage = &stages[idx];

    if stage.is_blocked {
        return Err(WorkflowError::StageBlocked(stage.code));
    }
    if !stage.requires_customer_action {
        return Err(WorkflowError::CustomerActionNotRequired(stage.code));
    }

    let note = note.trim();
    if note.is_empty() {
        return Err(WorkflowError::EmptyNote);
    }

    let stage = &mut stages[idx];
    stage.customer_action_completed = true;
    stage.customer_action_note = Some(note.to_string());
    stage.customer_action_completed_at = Some(now);

    Ok(advance_from(stages, idx, now))
}

/// Admin completes the active stage regardless of who it waits on. still refuses a blocked stage.
pub fn complete_active_stage(
    stages: &mut [WorkflowStage],
    now: Timestamp,
) -> Result<StageAdvance, WorkflowError> {
    let idx = active_index(stages).ok_or(WorkflowError::NoActiveStage)?;
    if stages[idx].is_blocked {
        return Err(WorkflowError::StageBlocked(stages[idx].code));
    }
    Ok(advance_from(stages, idx, now))
}

// marks stages[idx] completed and opens stage_order + 1 if there is one. no wraparound.
fn advance_from(stages: &mut [WorkflowStage], idx: usize, now: Timestamp) -> StageAdvance {
    let completed_order = stages[idx].stage_order;
    {
        let stage = &mut stages[idx];
        stage.status = StageStatus::Completed;
        stage.completed_at = Some(now);
    }

    let next = stages
        .iter_mut()
        .find(|s| s.stage_order == completed_order + 1);

    let activated = match next {
        Some(stage) => {
            stage.status = StageStatus::InProgress;
            Some(stage.code)
        }
        None => None,
    };

    StageAdvance {
        completed: stages[idx].code,
        activated,
    }
}

pub fn block_stage(
    stages: &mut [WorkflowStage],
    code: StageCode,
    reason: &str,
    now: Timestamp,
) -> Result<(), WorkflowError> {
    let idx = stage_index(stages, code)?;
    let stage = &mut stages[idx];
    if stage.status == StageStatus::Completed {
        return Err(WorkflowError::StageAlreadyCompleted(code));
    }
    stage.is_blocked = true;
    stage.blocked_reason = Some(reason.to_string());
    stage.blocked_at = Some(now);
    Ok(())
}

pub fn unblock_stage(stages: &mut [WorkflowStage], code: StageCode) -> Result<(), WorkflowError> {
    let idx = stage_index(stages, code)?;
    let stage = &mut stages[idx];
    if !stage.is_blocked {
        return Err(WorkflowError::StageNotBlocked(code));
    }
    stage.is_blocked = false;
    stage.blocked_reason = None;
    stage.blocked_at = None;
    Ok(())
}

/// Structural check: contiguous order, at most one stage in progress, and every
/// stage before the active one completed.
pub fn validate(stages: &[WorkflowStage]) -> Result<(), WorkflowError> {
    for (i, stage) in stages.iter().enumerate() {
        if stage.stage_order != i as u32 {
            return Err(WorkflowError::Corrupt(format!(
                "stage {} has order {} at position {}",
                stage.code, stage.stage_order, i
            )));
        }
    }

    let in_progress: Vec<usize> = stages
        .iter()
        .enumerate()
        .filter(|(_, s)| s.status == StageStatus::InProgress)
        .map(|(i, _)| i)
        .collect();

    if in_progress.len() > 1 {
        return Err(WorkflowError::Corrupt(format!(
            "{} stages in progress",
            in_progress.len()
        )));
    }

    // everything before the frontier is completed, everything after is pending
    let frontier = in_progress
        .first()
        .copied()
        .unwrap_or_else(|| stages.iter().take_while(|s| s.status == StageStatus::Completed).count());

    for (i, stage) in stages.iter().enumerate() {
        let ok = match i.cmp(&frontier) {
            std::cmp::Ordering::Less => stage.status == StageStatus::Completed,
            std::cmp::Ordering::Equal => stage.status == StageStatus::InProgress,
            std::cmp::Ordering::Greater => stage.status == StageStatus::Pending,
        };
        if !ok {
            return Err(WorkflowError::Corrupt(format!(
                "stage {} is {:?} relative to frontier {}",
                stage.code, stage.status, frontier
            )));
        }
    }

    Ok(())
}
