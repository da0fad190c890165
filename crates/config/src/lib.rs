//! Configuration: schema, discovery, env substitution and overrides.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, discover_and_load, load_config, set_config_dir},
    schema::{PairingConfig, PairlineConfig, ServerConfig, StorageConfig},
};
