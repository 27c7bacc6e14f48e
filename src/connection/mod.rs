//! Connection lifecycle management.

mod manager;
mod state;


pub use manager::ConnectionManager;
pub use state::{ConnectionState, LifecycleEvent};
