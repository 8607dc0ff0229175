use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    healrun_cli::cli::app::run().await
}
