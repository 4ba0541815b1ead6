//! Session state and the authentication flows that change it

mod manager;
mod state;

pub use manager::SessionManager;
pub use state::{SessionState, SessionStore};
