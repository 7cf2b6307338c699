pub mod adapters;
pub mod google_auth;
pub mod service;

pub use service::{build_router, run_server, RelayConfig, RelayError, RelayState};
