pub mod address;
pub mod config;
pub mod messages;
pub mod models;
pub mod siwe;
pub mod utils;

pub use address::*;
pub use config::*;
pub use messages::*;
pub use siwe::{SiweError, SiweMessage};
pub use utils::*;
