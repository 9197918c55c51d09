pub mod api;
pub mod config;
pub mod errors;
pub mod local_state;
pub mod logging;
pub mod realtime;
pub mod session;
pub mod trajectory;
pub mod ui;

pub use api::ApiClient;
pub use config::IssuedeskConfig;
pub use errors::{ClientError, RealtimeError, StreamError};
pub use local_state::{LocalState, StateStore};
