use super::RunContext;
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;

/// Compare the installed version with the latest release.
#[derive(Args, Debug)]
pub struct CheckCommand {}

impl CheckCommand {
    pub async fn execute(self, ctx: &RunContext) -> Result<()> {
        let result = ctx.orchestrator.check_for_updates(&ctx.config).await;
        ctx.reporter.finish();

        if !result.succeeded {
            bail!("{}", result.message);
        }

        if result.update_available() {
            ctx.reporter.say(format!(
                "{} {} -> {}",
                "Update available:".green().bold(),
                result.local_version,
                result.remote_version.to_string().green()
            ));
            if let Some(asset) = &result.asset_name {
                ctx.reporter.say(format!("  package: {asset}"));
            }
            ctx.reporter.say("Run `updraft update` to install it");
        } else {
            ctx.reporter.say(format!(
                "{} ({})",
                "Already up to date".green(),
                result.local_version
            ));
        }
        Ok(())
    }
}
