pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;
