//! JSON-lines dispatcher entry point.
//!
//! Reads one `{operation, args}` request per stdin line and writes one
//! response per line. Transport framing beyond stdio belongs to the
//! embedding host.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use lenswork_api::{Dispatcher, OperationRequest};
use lenswork_runtime::{RuntimeConfig, TaskRuntime};
use lenswork_stores::{InMemoryTaskStore, InMemoryTaskStoreConfig};
use lenswork_upstream::HttpUpstream;
use lenswork_workflows::builtin_registry;

#[derive(Debug, Parser)]
#[command(name = "lenswork-server")]
struct Args {
    /// Tracing filter, e.g. "info" or "lenswork_workflows=debug"
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&args.log)
                .context("invalid --log filter")?,
        )
        .with_writer(std::io::stderr)
        .init();

    let config = RuntimeConfig::from_env()?;
    let upstream = Arc::new(HttpUpstream::from_env().context("upstream configuration")?);
    let store = Arc::new(InMemoryTaskStore::with_config(InMemoryTaskStoreConfig {
        max_active: config.max_concurrent_tasks,
        ttl: chrono::Duration::seconds(config.task_ttl_secs as i64),
    }));
    let registry = Arc::new(builtin_registry());
    let runtime = Arc::new(TaskRuntime::new(
        store.clone(),
        upstream.clone(),
        registry,
    ));
    let sweeper = runtime.spawn_sweeper(Duration::from_secs(config.sweep_interval_secs));
    let dispatcher = Dispatcher::new(runtime.clone(), store, upstream);

    tracing::info!(
        workflows = ?runtime.workflow_names(),
        "lenswork server ready on stdio"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<OperationRequest>(&line) {
            Ok(request) => match dispatcher.dispatch(request).await {
                Ok(result) => json!({ "ok": true, "result": result }),
                Err(err) => json!({
                    "ok": false,
                    "error": { "code": format!("{:?}", err.code()), "message": err.to_string() }
                }),
            },
            Err(err) => json!({
                "ok": false,
                "error": { "code": "InvalidArgument", "message": format!("invalid request: {}", err) }
            }),
        };
        stdout.write_all(response.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    sweeper.shutdown().await;
    Ok(())
}
