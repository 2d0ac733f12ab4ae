use super::RunContext;
use anyhow::{Result, bail};
use clap::Args;

/// Start the target application.
#[derive(Args, Debug)]
pub struct LaunchCommand {}

impl LaunchCommand {
    pub fn execute(self, ctx: &RunContext) -> Result<()> {
        if ctx.config.target.executable.trim().is_empty() {
            bail!("No target executable configured (set target.executable or pass --exe)");
        }
        if !ctx.orchestrator.launch_target_app(&ctx.config) {
            bail!("Could not start {}", ctx.config.target.executable);
        }
        ctx.reporter.say(format!("Started {}", ctx.config.target.executable));
        Ok(())
    }
}
