//! Transfer Directus project templates between instances

mod api;
mod auth;
mod cli;
mod engine;
mod template;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    cli::run().await
}
