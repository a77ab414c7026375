//! Demo binary: resolves users through an instrumented resolver
//!
//! The `#[trace]` resolver always runs. With `--config`, the same lookup is
//! also served through a runtime class instrumented from the TOML file.

use anyhow::{Context, Result};
use clap::Parser;
use layer_trace::{install, logging, TraceConfig, Tracer};
use serde_json::json;
use std::path::PathBuf;

mod object_id;
mod user;

use object_id::ObjectId;
use user::{user_resolver_class, GetUserDto, UserResolver};

#[derive(Parser)]
#[command(name = "layer-trace-demo")]
#[command(about = "Resolve users through an instrumented resolver", long_about = None)]
struct Cli {
    /// User id to look up; a fresh one is generated when omitted
    #[arg(long)]
    id: Option<String>,

    /// Number of lookups
    #[arg(short = 'n', long, default_value = "1")]
    count: u32,

    /// Trace configuration for the runtime-instrumented resolver
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    logging::init_tracing(log_level);

    let filter = GetUserDto::new(cli.id.unwrap_or_else(|| ObjectId::new().to_hex()));
    filter.validate()?;

    let resolver = UserResolver::new();
    for _ in 0..cli.count {
        let user = resolver.get_user(filter.clone()).await;
        tracing::info!(user = ?user, "Resolved user");
    }

    if let Some(path) = cli.config {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = TraceConfig::from_toml_str(&text)
            .with_context(|| format!("loading {}", path.display()))?;

        let mut class = user_resolver_class();
        let tracer = Tracer::new(class.name(), config);
        let report = install(&mut class, &tracer);
        tracing::debug!(wrapped = ?report.wrapped, "Runtime resolver instrumented");

        let receiver = class.construct(&[])?;
        for _ in 0..cli.count {
            let user = class.invoke(&receiver, "get_user", &[json!(filter)])?;
            tracing::info!(user = %user, "Resolved user through runtime class");
        }
    }

    Ok(())
}
