//! Operator-driven acquisition: state machine, key input and the polling loop.

mod controller;
pub mod operator;
mod state;

pub use controller::{AcquisitionController, RunSummary};
pub use operator::{ChannelInput, EdgeTrigger, KeyLevelSource, OperatorInput};
pub use state::{AcquisitionState, OperatorCommand, TransitionAction};
