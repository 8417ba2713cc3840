use anyhow::Result;

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    search_fusion::cli::run().await
}
