//! Run scenarios against a real browser

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{error, info};

use e2e2d::{E2e2dArgs, PlaywrightPage, Runner};

use crate::commands::scenarios::collect;
use crate::output::{print_error, print_success};

#[derive(Args)]
pub struct RunArgs {
    /// Scenario files or directories
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Run only scenarios carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Run only the scenario with this name
    #[arg(short, long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub e2e2d: E2e2dArgs,
}

/// Returns whether every scenario passed
pub async fn execute(args: RunArgs) -> Result<bool> {
    let mut config = args.e2e2d.into_config();
    config
        .load_config_data()
        .context("Loading scenario config data")?;

    let mut scenarios = collect(&args.paths, args.tag.as_deref())?;
    if let Some(name) = &args.name {
        scenarios.retain(|s| &s.name == name);
    }
    info!("Running {} scenario(s)", scenarios.len());

    let pw = config.pw.clone();
    let runner = Runner::new(config);
    let mut passed = 0;
    let mut failed = Vec::new();

    for scenario in &scenarios {
        let chain = scenario.to_chain()?;
        let page = PlaywrightPage::launch(&pw)
            .await
            .with_context(|| format!("Launching the browser for '{}'", scenario.name))?;

        match runner
            .in_order_to(&scenario.name, &scenario.description, Arc::new(page), chain)
            .await
        {
            Ok(report) if report.success() => passed += 1,
            Ok(report) => {
                error!("'{}' failed: {:?}", report.name, report.outcome);
                failed.push(scenario.name.clone());
            }
            Err(e) => {
                error!("'{}' failed: {}", scenario.name, e);
                failed.push(scenario.name.clone());
            }
        }
    }

    if failed.is_empty() {
        print_success(&format!("{} scenario(s) passed", passed));
        Ok(true)
    } else {
        print_error(&format!(
            "{} passed, {} failed: {}",
            passed,
            failed.len(),
            failed.join(", ")
        ));
        Ok(false)
    }
}
