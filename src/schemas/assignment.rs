use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use validator::Validate;

use crate::api::pagination::default_limit;
use crate::core::time::{format_optional, format_primitive};
use crate::db::models::Assignment;
use crate::db::types::{AssignmentStatus, AttemptStatus, IntegrityAction};
use crate::schemas::attempt::AttemptResponse;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AssignmentCreate {
    #[validate(length(min = 1, message = "generated_test_id must not be empty"))]
    pub(crate) generated_test_id: String,
    #[validate(length(min = 1, max = 255, message = "title must be 1..=255 characters"))]
    pub(crate) title: String,
    #[validate(length(min = 1, max = 1000, message = "student_ids must hold 1..=1000 ids"))]
    pub(crate) student_ids: Vec<String>,
    #[serde(deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) starts_at: OffsetDateTime,
    #[serde(deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) ends_at: OffsetDateTime,
    #[validate(range(min = 1, max = 1440, message = "duration_minutes must be 1..=1440"))]
    pub(crate) duration_minutes: i32,
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 50, message = "max_attempts must be 1..=50"))]
    pub(crate) max_attempts: i32,
    #[serde(default = "default_true")]
    pub(crate) shuffle_per_student: bool,
    #[serde(default)]
    #[validate(length(min = 4, max = 64, message = "access_code must be 4..=64 characters"))]
    pub(crate) access_code: Option<String>,
    #[serde(default)]
    pub(crate) generate_access_code: bool,
    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "tab_switch_threshold must be 0..=100"))]
    pub(crate) tab_switch_threshold: i32,
    #[serde(default = "default_action")]
    pub(crate) tab_switch_action: IntegrityAction,
    #[serde(default = "default_status")]
    pub(crate) status: AssignmentStatus,
}

fn default_max_attempts() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_action() -> IntegrityAction {
    IntegrityAction::Warn
}

fn default_status() -> AssignmentStatus {
    AssignmentStatus::Active
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) id: String,
    pub(crate) generated_test_id: String,
    pub(crate) owner_id: String,
    pub(crate) title: String,
    pub(crate) status: AssignmentStatus,
    pub(crate) starts_at: String,
    pub(crate) ends_at: String,
    pub(crate) duration_minutes: i32,
    pub(crate) max_attempts: i32,
    pub(crate) shuffle_per_student: bool,
    pub(crate) requires_access_code: bool,
    pub(crate) tab_switch_threshold: i32,
    pub(crate) tab_switch_action: IntegrityAction,
    pub(crate) student_ids: Vec<String>,
    /// Plain code, returned once at creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) access_code: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) closed_at: Option<String>,
}

impl AssignmentResponse {
    pub(crate) fn from_db(assignment: Assignment, student_ids: Vec<String>) -> Self {
        Self {
            requires_access_code: assignment.access_code_hash.is_some(),
            id: assignment.id,
            generated_test_id: assignment.generated_test_id,
            owner_id: assignment.owner_id,
            title: assignment.title,
            status: assignment.status,
            starts_at: format_primitive(assignment.starts_at),
            ends_at: format_primitive(assignment.ends_at),
            duration_minutes: assignment.duration_minutes,
            max_attempts: assignment.max_attempts,
            shuffle_per_student: assignment.shuffle_per_student,
            tab_switch_threshold: assignment.tab_switch_threshold,
            tab_switch_action: assignment.tab_switch_action,
            student_ids,
            access_code: None,
            created_at: format_primitive(assignment.created_at),
            updated_at: format_primitive(assignment.updated_at),
            closed_at: format_optional(assignment.closed_at),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StartAttemptRequest {
    #[serde(default)]
    pub(crate) access_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttemptListQuery {
    #[serde(default)]
    pub(crate) status: Option<AttemptStatus>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum StudentProgressState {
    NotStarted,
    Attempted,
}

#[derive(Debug, Serialize)]
pub(crate) struct MyStatusResponse {
    pub(crate) assignment_id: String,
    pub(crate) state: StudentProgressState,
    pub(crate) remaining_attempts: i64,
    pub(crate) attempt: Option<AttemptResponse>,
}

fn deserialize_offset_datetime_flexible<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_offset_datetime_flexible(&raw)
        .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}

/// RFC 3339, or a zone-less `YYYY-MM-DDTHH:MM[:SS]` read as UTC.
fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value.assume_utc());
    }
    PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .ok()
    .map(PrimitiveDateTime::assume_utc)
}
