//! Structured progress events.
//!
//! The engine reports phase transitions, retries and outcomes as
//! [`RestoreEvent`]s through an [`EventHandle`]. A presentation layer owns
//! the receiving end and decides how to render them.

mod handle;
mod types;

pub use handle::*;
pub use types::*;
