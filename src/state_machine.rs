//! Shop dialogue state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::{Event, EventKind};
pub use state::{DialogState, PURCHASE_OPTIONS};
pub use transition::{transition, TransitionError};
