//! Camaudit - IP camera security assessor
//!
//! Main entry point: load the assessment config, run one workflow session,
//! print where the deliverables landed.

use std::path::PathBuf;

use anyhow::Context;
use camaudit::config::{AssessmentConfig, TargetSpec};
use camaudit::workflow::AssessmentWorkflow;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "camaudit")]
#[command(about = "Automated security assessor for IP cameras")]
struct Args {
    /// Assessment config file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target host or CIDR; repeatable, overrides the config targets
    #[arg(short, long)]
    target: Vec<String>,

    /// Output directory for session artifacts
    #[arg(short, long, default_value = "./assessments")]
    output: PathBuf,

    /// Print progress every few seconds while the session runs
    #[arg(long)]
    progress: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camaudit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AssessmentConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AssessmentConfig::default(),
    };
    if !args.target.is_empty() {
        config.targets = args
            .target
            .iter()
            .map(|t| TargetSpec::new(t.clone(), Vec::new()))
            .collect();
    }
    if config.targets.is_empty() {
        anyhow::bail!("no targets: pass --target or a config file with a targets section");
    }

    let workflow = AssessmentWorkflow::new(config, &args.output)?;
    tracing::info!(
        session_id = %workflow.session_id(),
        dir = %workflow.session_dir().display(),
        "starting assessment"
    );

    if args.progress {
        let handle = workflow.handle();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
            loop {
                interval.tick().await;
                let progress = handle.progress().await;
                tracing::info!(
                    phase = %progress.current_phase,
                    module = %progress.current_module,
                    completed = progress.completed_modules.len(),
                    failed = progress.failed_modules.len(),
                    elapsed_ms = progress.elapsed_ms,
                    "progress"
                );
            }
        });
    }

    let outcome = workflow.run().await?;
    tracing::info!(
        session_id = %outcome.session_id,
        report = %outcome.session_dir.join("deliverables/security_assessment_report.md").display(),
        "assessment finished"
    );

    Ok(())
}
