pub mod cataloger;
pub mod config;
pub mod errors;
pub mod generator;
pub mod logging;
pub mod scheduler;
pub mod server;
pub mod status;
pub mod store;
