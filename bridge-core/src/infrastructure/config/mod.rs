pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{load_config, load_config_from_file, load_config_with_profile};
pub use types::*;
