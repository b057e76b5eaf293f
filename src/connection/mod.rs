//! Realtime connection lifecycle.
//!
//! ```text
//! disconnected --subscribe--> connecting --connected--> connected
//! connecting|connected --disconnected--> disconnected
//! disconnected --reconnect timer (>= delay floor)--> connecting
//! any --error--> error        (explicit subscribe required)
//! any --unsubscribe--> disconnected
//! ```

mod state;
mod supervisor;

pub use state::{Action, ConnectionMachine, Transition};
pub use supervisor::{ChangeHandler, ConnectionSupervisor};
