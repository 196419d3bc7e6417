use anyhow::Result;
use stela::cli::{App, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    App::new().run(args).await?;

    Ok(())
}
