pub mod config;
pub mod routes;
pub mod state;

pub use config::{ConfigError, ServerConfig, StoreKind};
pub use routes::router;
pub use state::AppState;
