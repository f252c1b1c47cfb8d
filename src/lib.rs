pub mod accounts;
pub mod admin;
pub mod capture;
pub mod config;
pub mod constants;
pub mod content;
pub mod error;
pub mod game_state;
pub mod placement;
pub mod proximity;
pub mod rankings;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod session;
pub mod store;
pub mod types;
