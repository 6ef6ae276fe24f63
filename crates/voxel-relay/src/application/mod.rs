//! Application layer: the control-link seam and the stream session
//! coordinator.

pub mod control_link;
pub mod coordinator;

pub use control_link::{ControlError, ControlLink};
pub use coordinator::{SessionError, StreamCoordinator};
