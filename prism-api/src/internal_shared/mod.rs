mod context_tracker;
pub(crate) use context_tracker::*;

mod validation;
pub(crate) use validation::*;
