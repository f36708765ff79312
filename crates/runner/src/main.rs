//! `fleetrun` -- run a script across a fleet of instances.
//!
//! With only an environment, account, and region, lists the running
//! instances the credential can see. With a script file and instance
//! IDs, runs the script on each instance and prints the batch result
//! as JSON. Exits non-zero unless every execution completed.
//!
//! ```text
//! fleetrun <environment> <account> <region> [script-file instance-id...]
//! ```
//!
//! # Environment variables
//!
//! | Variable                | Required | Default | Description                         |
//! |-------------------------|----------|---------|-------------------------------------|
//! | `AWS_ACCESS_KEY_ID`     | yes      | --      | Base credential access key          |
//! | `AWS_SECRET_ACCESS_KEY` | yes      | --      | Base credential secret key          |
//! | `AWS_SESSION_TOKEN`     | no       | --      | Present for temporary credentials   |
//! | `FLEETRUN_PROVIDER`     | no       | `aws`   | Provider to resolve transports from |
//!
//! Engine tuning variables are documented on `EngineConfig::from_env`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetrun_aws::registry::ProviderRegistry;
use fleetrun_core::config::EngineConfig;
use fleetrun_core::execution::BatchStatus;
use fleetrun_core::instance::{DiscoveryFilters, InstanceState};
use fleetrun_core::script::{InterpreterType, Script};
use fleetrun_core::types::Environment;
use fleetrun_engine::{BatchRequest, LogSink, ScriptEngine};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetrun=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    let provider = std::env::var("FLEETRUN_PROVIDER").unwrap_or_else(|_| "aws".into());
    let registry = ProviderRegistry::aws_only(config.session_duration);
    let transports = registry
        .get(&provider)
        .with_context(|| format!("unknown provider {provider:?}"))?
        .clone();
    let engine = ScriptEngine::with_sink(config, transports, Arc::new(LogSink));

    let mut args = std::env::args().skip(1);
    let usage = "usage: fleetrun <environment> <account> <region> [script-file instance-id...]";
    let Some(environment) = args.next() else {
        bail!("{usage}");
    };
    let environment =
        Environment::parse(&environment).context("environment must be `com` or `gov`")?;
    let account = args.next().with_context(|| usage)?;
    let region = args.next().with_context(|| usage)?;
    let script_path = args.next();
    let instance_ids: Vec<String> = args.collect();

    let access_key_id =
        std::env::var("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID is not set")?;
    let secret_access_key =
        std::env::var("AWS_SECRET_ACCESS_KEY").context("AWS_SECRET_ACCESS_KEY is not set")?;
    let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

    let caller = engine
        .put_credentials(environment, access_key_id, secret_access_key, session_token)
        .await?;
    tracing::info!(account = %caller.account, arn = %caller.arn, "Authenticated");

    let Some(script_path) = script_path else {
        let filters = DiscoveryFilters::default().with_state(InstanceState::Running);
        let instances = engine
            .list_instances(environment, &account, &region, &filters)
            .await?;
        for instance in &instances {
            println!(
                "{}\t{:?}\t{}",
                instance.id,
                instance.platform,
                instance.private_ip.as_deref().unwrap_or("-"),
            );
        }
        tracing::info!(count = instances.len(), "Listed running instances");
        return Ok(());
    };

    if instance_ids.is_empty() {
        bail!("{usage}");
    }

    let content = std::fs::read_to_string(&script_path)
        .with_context(|| format!("reading script {script_path:?}"))?;
    let interpreter = if Path::new(&script_path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ps1"))
    {
        InterpreterType::PowerShell
    } else {
        InterpreterType::Shell
    };

    let result = engine
        .run_batch(BatchRequest {
            environment,
            account,
            region,
            script: Script::new(content, interpreter),
            instance_ids,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.status != BatchStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}
