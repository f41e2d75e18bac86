//! Coreloop CLI entry point.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    coreloop::cli::run().await
}
