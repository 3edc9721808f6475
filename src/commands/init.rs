//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

impl InitOptions {
    /// Resolve paths from an optional `--config` argument.
    ///
    /// A `.toml` path names the config file; anything else is the base directory.
    pub fn from_config_arg(path: Option<PathBuf>, force: bool) -> Self {
        let (base_dir, config_path) = match path {
            Some(path) if path.extension().is_some_and(|e| e == "toml") => {
                let base = path
                    .parent()
                    .map(PathBuf::from)
                    .unwrap_or_else(Config::default_base_dir);
                (base, path)
            }
            Some(dir) => (dir.clone(), dir.join("config.toml")),
            None => {
                let base = Config::default_base_dir();
                (base.clone(), base.join("config.toml"))
            }
        };
        Self {
            base_dir,
            config_path,
            force,
        }
    }
}

/// Write the default config and create the database schema
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::AlreadyInitialized(config_path.display().to_string()));
    }

    let mut config = Config::default();
    config.paths.base_dir = base_dir.clone();
    config.paths.config_file = config_path;
    config.paths.db_file = base_dir.join("metadata.db");
    config.validate()?;
    config.save()?;

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(config)
}

pub fn print_init(config: &Config) {
    println!("✓ Initialized lectern at {:?}", config.paths.base_dir);
    println!("\nConfiguration: {:?}", config.paths.config_file);
    println!("Database: {:?}", config.paths.db_file);
    println!("\nNext steps:");
    println!(
        "  export {}=...                               # Provider API key",
        config.provider.api_key_env
    );
    println!("  lectern enqueue m1 https://host/w1.pdf --course c1   # Queue a material");
    println!("  lectern worker --once                               # Process the queue");
    println!("  lectern query \"what is covered in week 1?\"          # Ask a question");
}
