//! Primary entrypoint for the `unweb` CLI binary.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    unweb_cli::run().await
}
