mod config;
pub mod logging;
pub mod network;
pub mod secret;

pub use self::config::Config;
