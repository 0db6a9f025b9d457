pub(crate) mod errors;
pub(crate) mod essays;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod homeworks;
pub(crate) mod router;
pub(crate) mod submissions;
pub(crate) mod validation;
