//! Per-conversation distress state.
//!
//! - [`thresholds`]: score bands and overlap resolution
//! - [`session`]: what one conversation remembers
//! - [`machine`]: overrides, hysteresis and the escalation timeout
//! - [`store`]: concurrent registry with idle expiry

pub mod machine;
pub mod session;
pub mod store;
pub mod thresholds;

pub(crate) use machine::enter_state;
pub use machine::{EvaluationInput, StateMachine, Transition, TransitionReason};
pub use session::{ActiveIntervention, PendingCandidate, Session, CONFIDENCE_HISTORY_LEN};
pub use store::SessionStore;
pub use thresholds::{BandEntry, ThresholdBand, ThresholdTable};
