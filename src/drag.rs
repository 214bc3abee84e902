//! Drag gesture state machine for the board.
//!
//! `Idle -> Dragging -> {dropped same, dropped moved, cancelled}`. "Same" means
//! the exact slot the card was picked up from. A drop onto the Rejected column
//! does not mutate; it parks the card in `AwaitingReason` until a reason is
//! confirmed or the prompt is cancelled.

use tracing::debug;

use crate::error::{Result, TrackerError};
use crate::models::{ApplicationStatus, StatusChange};

/// Canonical rejection categories offered by the reason prompt.
pub const REJECTION_REASONS: [&str; 16] = [
    "Generic 'Not A Good Fit'",
    "Filled - Internal",
    "No New Applicants",
    "Eliminated Role",
    "Changed Job Scope",
    "Applied Too Late",
    "Auto-Reject: No Feedback Provided",
    "1st Round Rejection - Feedback Provided",
    "1st Round Rejection - No Feedback Provided",
    "Middle Round Rejection - Feedback Provided",
    "Middle Round Rejection - No Feedback Provided",
    "N/A",
    "Final Round Rejection - Feedback Provided",
    "Final Round Rejection - No Feedback Provided",
    "No Response: Sent Email",
    "Post-Interview Follow-Up Email",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropLocation {
    pub column: ApplicationStatus,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEvent {
    Start {
        id: String,
        source: DropLocation,
    },
    Drop {
        id: String,
        source: DropLocation,
        destination: Option<DropLocation>,
    },
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging { id: String, source: DropLocation },
    AwaitingReason { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropDecision {
    /// Nothing to do: no destination, same slot, cancelled, or a prompt is open.
    Ignore,
    Mutate(StatusChange),
    AwaitReason { id: String },
}

#[derive(Debug, Clone)]
pub struct DragController {
    state: DragState,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new()
    }
}

impl DragController {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn pending_rejection(&self) -> Option<&str> {
        match &self.state {
            DragState::AwaitingReason { id } => Some(id),
            _ => None,
        }
    }

    pub fn handle(&mut self, event: DragEvent) -> DropDecision {
        if let DragState::AwaitingReason { .. } = self.state {
            debug!(?event, "reason prompt open, ignoring drag event");
            return DropDecision::Ignore;
        }

        match event {
            DragEvent::Start { id, source } => {
                self.state = DragState::Dragging { id, source };
                DropDecision::Ignore
            }
            DragEvent::Cancel => {
                self.state = DragState::Idle;
                DropDecision::Ignore
            }
            DragEvent::Drop {
                id,
                source,
                destination,
            } => {
                self.state = DragState::Idle;
                let Some(destination) = destination else {
                    return DropDecision::Ignore;
                };
                // Dropped back where it was picked up. A reorder within a
                // column still re-submits the column's status.
                if destination == source {
                    return DropDecision::Ignore;
                }
                if destination.column == ApplicationStatus::Rejected {
                    self.state = DragState::AwaitingReason { id: id.clone() };
                    return DropDecision::AwaitReason { id };
                }
                DropDecision::Mutate(StatusChange::new(id, destination.column))
            }
        }
    }

    /// Resolves the reason prompt. An empty category keeps the prompt open.
    pub fn confirm_rejection(&mut self, category: &str, detail: &str) -> Result<StatusChange> {
        let Some(id) = self.pending_rejection().map(str::to_string) else {
            return Err(TrackerError::Validation(
                "no rejection is awaiting a reason".into(),
            ));
        };
        let reason = compose_rejection_reason(category, detail)?;
        self.state = DragState::Idle;
        Ok(StatusChange::rejected(id, reason))
    }

    /// Closes the reason prompt without touching the application.
    pub fn cancel_rejection(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::AwaitingReason { id } => Some(id),
            other => {
                self.state = other;
                None
            }
        }
    }
}

/// `category`, or `category - detail` when a detail was given.
pub fn compose_rejection_reason(category: &str, detail: &str) -> Result<String> {
    let category = category.trim();
    if category.is_empty() {
        return Err(TrackerError::Validation(
            "a rejection category is required".into(),
        ));
    }
    let detail = detail.trim();
    if detail.is_empty() {
        Ok(category.to_string())
    } else {
        Ok(format!("{} - {}", category, detail))
    }
}
