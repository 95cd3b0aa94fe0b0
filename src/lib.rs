pub mod config;
pub mod error;
pub mod db;
pub mod catalog;
pub mod store;
pub mod pedigree;
pub mod events;
pub mod service;
pub mod site;
pub mod http;

pub use config::Config;
pub use error::{CatteryError, Result};
pub use service::Cattery;
