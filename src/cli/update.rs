use super::RunContext;
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Install the latest release if it is newer.
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Start the target application after a successful update.
    #[arg(long)]
    launch: bool,
}

impl UpdateCommand {
    pub async fn execute(self, ctx: &RunContext) -> Result<()> {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling update");
                    cancel.cancel();
                }
            }
        });

        let mut config = ctx.config.clone();
        if self.launch {
            config.update.launch_after_update = true;
        }

        let outcome = ctx.orchestrator.perform_update(&config, &cancel).await;
        watcher.abort();
        ctx.reporter.finish();

        if outcome.succeeded {
            ctx.reporter.say(format!(
                "{} {} -> {}",
                "Updated".green().bold(),
                outcome.old_version,
                outcome.new_version
            ));
            return Ok(());
        }

        if cancel.is_cancelled() {
            bail!("Update cancelled, previous installation kept");
        }
        if outcome.new_version > outcome.old_version {
            bail!(
                "Update to {} failed, previous installation kept",
                outcome.new_version
            );
        }
        if outcome.new_version == crate::upgrade::Version::ZERO {
            bail!("Update check failed, nothing was changed");
        }

        ctx.reporter.say(format!(
            "{} ({})",
            "Already up to date".green(),
            outcome.old_version
        ));
        Ok(())
    }
}
