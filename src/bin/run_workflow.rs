//! Runs one enrichment workflow to completion and prints its summary as JSON.
//!
//! ```text
//! run_workflow usage '{"batch_size": 50, "max_orgs": 10}'
//! run_workflow company '{"specific_account_id": "001ABC123"}'
//! ```

use crm_enrichment::config::Config;
use crm_enrichment::db::Database;
use crm_enrichment::handlers::AppState;
use crm_enrichment::task_queue::TaskQueue;
use crm_enrichment::workflows::{CompanyEnrichmentInputs, UsageEnrichmentInputs};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

enum Selected {
    Usage(UsageEnrichmentInputs),
    Company(CompanyEnrichmentInputs),
}

fn parse_args(args: &[String]) -> anyhow::Result<Selected> {
    let (kind, payload) = args
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("usage: run_workflow <usage|company> [json-payload]"))?;

    match kind.as_str() {
        "usage" => Ok(Selected::Usage(UsageEnrichmentInputs::parse_inputs(payload)?)),
        "company" => Ok(Selected::Company(CompanyEnrichmentInputs::parse_inputs(
            payload,
        )?)),
        other => anyhow::bail!("unknown workflow '{}', expected usage or company", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crm_enrichment=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Validate the payload before touching configuration or the network
    let args: Vec<String> = std::env::args().skip(1).collect();
    let selected = parse_args(&args)?;

    let config = Config::from_env()?;
    let db = Database::lazy(&config.database_url)?;
    let state = AppState::new(config, db.pool)?;
    let queue = TaskQueue::new(state.retry_policy);

    let summary = match selected {
        Selected::Usage(inputs) => state.usage_workflow.run(&inputs, &queue).await?,
        Selected::Company(inputs) => state.company_workflow.run(&inputs, &queue).await?,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !summary.is_total_success() {
        anyhow::bail!(
            "{} record(s) failed, {} chunk(s) failed",
            summary.failed,
            summary.chunks_failed
        );
    }
    Ok(())
}
