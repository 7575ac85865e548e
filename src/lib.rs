// Library module for the JWKS server

pub mod config;
pub mod db;
pub mod endpoints;
pub mod error;
pub mod jwks;
pub mod key_management;
pub mod registry;
pub mod server;
pub mod token;
pub mod types;

pub use error::{JwksError, Result};
