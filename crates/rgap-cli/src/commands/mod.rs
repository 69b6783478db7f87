//! CLI command implementations.

pub mod search;

use std::path::Path;

use anyhow::{Context, Result};
use rgap_config::load_system_config;
use rgap_db::{PgUserRepo, UserRepo, create_pool, run_migrations};
use sqlx::PgPool;

async fn connect(config_path: &str) -> Result<PgPool> {
    let config = load_system_config(Path::new(config_path))
        .with_context(|| format!("loading {}", config_path))?;
    let pool = create_pool(&config.database.url, 1)
        .await
        .context("connecting to database")?;
    Ok(pool)
}

pub async fn migrate(config_path: &str) -> Result<()> {
    let pool = connect(config_path).await?;
    run_migrations(&pool).await?;
    println!("Migrations applied");
    Ok(())
}

pub async fn purge_sessions(config_path: &str) -> Result<()> {
    let pool = connect(config_path).await?;
    let purged = PgUserRepo::new(pool).delete_expired_sessions().await?;
    println!("Removed {} expired sessions", purged);
    Ok(())
}

pub fn check_config(config_path: &str) -> Result<()> {
    match load_system_config(Path::new(config_path)) {
        Ok(config) => {
            println!("Configuration is valid");
            println!("  listen:       {}", config.server.listen);
            println!("  connections:  {}", config.database.max_connections);
            println!("  session ttl:  {} days", config.auth.session_ttl_days);
            println!(
                "  page size:    {} (max {})",
                config.search.default_page_size, config.search.max_page_size
            );
            println!(
                "  default sort: {} {}",
                config.search.default_sort.field.as_str(),
                config.search.default_sort.direction.as_sql().to_lowercase()
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
