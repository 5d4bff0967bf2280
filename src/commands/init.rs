//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: Option<PathBuf>,
    pub force: bool,
}

/// Initialize ragline configuration and database
pub async fn cmd_init(options: InitOptions) -> Result<()> {
    let mut config = Config::default();
    config.init_paths(options.base_dir);

    if config.paths.config_file.exists() && !options.force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config.paths.config_file.display()
        )));
    }

    config.validate()?;
    config.save()?;
    info!("Created config at {:?}", config.paths.config_file);

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    std::fs::create_dir_all(&config.paths.blobs_dir)?;

    println!("Initialized ragline at {:?}", config.paths.base_dir);
    println!("\nConfiguration: {:?}", config.paths.config_file);
    println!("Database: {:?}", config.paths.db_file);
    println!("\nNext steps:");
    println!("  ragline kb add <tenant> <name>                 # Create a knowledge base");
    println!("  ragline agent add <tenant> <name>              # Create an agent");
    println!("  ragline ingest <tenant> <kb> ./policy.pdf      # Index a document");
    println!("  ragline ask <tenant> <agent> \"a question\"      # Ask");

    Ok(())
}
