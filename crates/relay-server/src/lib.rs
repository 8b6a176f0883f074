pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;
pub mod transport;
pub mod utils;
