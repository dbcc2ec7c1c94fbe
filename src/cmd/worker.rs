//! Child side of the process pool: `repobuild worker` (hidden).

use anyhow::Result;
use repobuild::pipeline::worker::run_worker;
use tracing::debug;

pub async fn cmd_worker() -> Result<()> {
    let processed = run_worker(tokio::io::stdin(), tokio::io::stdout()).await?;
    debug!(processed, "worker finished assignment");
    Ok(())
}
