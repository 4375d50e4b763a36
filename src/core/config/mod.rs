pub mod data;
pub mod io;

pub use data::{Config, CustomProvider};
pub use io::ConfigError;
