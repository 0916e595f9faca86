//! `almapipo migrate` command implementation

use anyhow::Result;
use tracing::info;

use almapipo_core::config::Config;
use almapipo_core::db;

pub async fn run(config: &Config) -> Result<()> {
    let pool = db::create_pool(&config.database).await?;
    db::health_check(&pool).await?;
    db::migrate(&pool).await?;

    info!("Database schema is up to date");
    println!("Migrations applied.");
    Ok(())
}
