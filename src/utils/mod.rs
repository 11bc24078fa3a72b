pub mod config;
pub mod env;
pub mod logger;
pub mod shardflow_toml;

pub use config::*;
pub use env::{EnvKeys, apply_env_to_opts, apply_env_with, load_dotenv};
pub use logger::setup_logging;
pub use shardflow_toml::{
    ShardflowToml, apply_file_to_opts, load_shardflow_toml, parse_shardflow_toml,
};
