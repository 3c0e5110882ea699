pub mod config;
pub mod constants;
pub mod energy;
pub mod engine;
pub mod error;
pub mod fog;
pub mod logging;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;
pub mod world;
