//! Restore request records.
//!
//! A [`RequestSpec`] is one raw input row. Validation turns it into a
//! [`RestoreRecord`], which carries the immutable object identity plus the
//! mutable lifecycle state driven by exactly one worker.

mod record;
mod spec;
mod types;

pub use record::{PhaseChange, RecordAttempts, RestoreRecord, TransitionError};
pub use spec::RequestSpec;
pub use types::{FailureReason, ObjectIdentity, Phase, RequestContext, RetrievalTier};

pub(crate) use types::join_key;
