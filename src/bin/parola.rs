use anyhow::Result;
use parola::cli::{self, actions::server};

#[tokio::main]
async fn main() -> Result<()> {
    let action = cli::start()?;

    server::handle(action).await?;

    Ok(())
}
