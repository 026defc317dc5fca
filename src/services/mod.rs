pub(crate) mod access_codes;
pub(crate) mod attempt_grading;
pub(crate) mod attempts;
pub(crate) mod generation;
pub(crate) mod grading;
pub(crate) mod progress;
