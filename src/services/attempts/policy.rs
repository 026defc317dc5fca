use sha2::{Digest, Sha256};
use time::PrimitiveDateTime;

use crate::db::models::Assignment;
use crate::db::types::{AssignmentStatus, IntegrityAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WindowState {
    Open,
    NotActive,
    NotOpenYet,
    Closed,
}

pub(crate) fn window_state(assignment: &Assignment, now: PrimitiveDateTime) -> WindowState {
    if assignment.status != AssignmentStatus::Active {
        return WindowState::NotActive;
    }
    if now < assignment.starts_at {
        return WindowState::NotOpenYet;
    }
    if now > assignment.ends_at {
        return WindowState::Closed;
    }
    WindowState::Open
}

/// Picks the variant for a student's `ordinal`-th attempt (1-based).
///
/// With per-student shuffling the index comes from a SHA-256 of
/// `student|assignment|ordinal`; otherwise attempts rotate through variants.
pub(crate) fn variant_index(
    student_id: &str,
    assignment_id: &str,
    ordinal: u32,
    variant_count: u32,
    per_student: bool,
) -> u32 {
    if variant_count == 0 {
        return 0;
    }

    if !per_student {
        return ordinal.saturating_sub(1) % variant_count;
    }

    let digest = Sha256::digest(format!("{student_id}|{assignment_id}|{ordinal}").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % u64::from(variant_count)) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Escalation {
    None,
    Warn,
    Flag,
    AutoSubmit,
}

impl Escalation {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Warn => "warn",
            Self::Flag => "flag",
            Self::AutoSubmit => "auto_submit",
        }
    }
}

/// A threshold of zero disables escalation.
pub(crate) fn escalation(violations: i32, threshold: i32, action: IntegrityAction) -> Escalation {
    if threshold <= 0 || violations < threshold {
        return Escalation::None;
    }

    match action {
        IntegrityAction::Warn => Escalation::Warn,
        IntegrityAction::Flag => Escalation::Flag,
        IntegrityAction::AutoSubmit => Escalation::AutoSubmit,
    }
}

pub(crate) fn flag_reason(violations: i32, threshold: i32) -> String {
    format!("tab switches reached {violations} (threshold {threshold})")
}
