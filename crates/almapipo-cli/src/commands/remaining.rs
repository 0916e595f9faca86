//! `almapipo remaining` command implementation

use anyhow::Result;

use almapipo_core::config::Config;
use almapipo_core::rest::RecordClient;

use super::client;

pub async fn run(config: &Config) -> Result<()> {
    let client = client(config)?;
    let remaining = client.calls_remaining().await?;
    println!("{remaining}");
    Ok(())
}
