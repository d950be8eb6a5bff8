pub mod config;
pub mod logging;
pub mod platform;
pub mod probe;
pub mod recorder;
pub mod render;
pub mod sampler;
pub mod session;
pub mod stats;
pub mod window;

pub use config::AppConfig;
pub use session::Session;
