//! Session establishment state machine

mod coordinator;
mod state;

pub use coordinator::SessionCoordinator;
pub use state::{Notification, Role, SessionState};
