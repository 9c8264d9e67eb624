//! Prelude for common imports used throughout all sound alarm crates

pub use crate::error::{Error, Result, ResultExt};
pub use tracing::{debug, error, info, trace, warn};
