pub(crate) mod assignments;
pub(crate) mod attempts;
pub(crate) mod errors;
pub(crate) mod generation;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod pagination;
pub(crate) mod router;
