//! Waitroom server library
//!
//! HTTP facade over the waitroom control plane: queue enter/status for
//! clients, activity administration, and the process wiring that runs the
//! release scheduler next to the API.

pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use error::{Error, Result};
pub use server::{router, run};
pub use state::AppState;
