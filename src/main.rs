use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::ServiceExt;
use rmcp::transport::stdio;

mod config;
mod kube;
mod mcp;
mod utils;

use config::{ConfigArgs, Settings};
use kube::Dispatcher;
use mcp::KubeServer;

/// kube-mcp - MCP server exposing kubectl as four tools
///
/// Tools:
///   kubectl_apply     { yaml_content, namespace? }
///   kubectl_get       { resource_type, namespace?, name? }
///   kubectl_describe  { resource_type, name, namespace? }
///   kubectl_delete    { yaml_content, namespace? }
///
/// Speaks MCP over stdio; logs go to stderr.
///
/// Configuration (flag > env > config file > default):
///   --kubeconfig    K8S_MCP_KUBECONFIG, KUBECONFIG (first entry), ~/.kube/config
///   --context       K8S_MCP_CONTEXT
///   --kubectl       K8S_MCP_KUBECTL (default "kubectl")
///   --timeout-secs  K8S_MCP_TIMEOUT_SECS (default: none)
///   --config        K8S_MCP_CONFIG (YAML with the same keys)
///
/// Exits with status 1 if the kubeconfig is missing or unreadable.
#[derive(Parser, Debug)]
#[command(
    name = "kube-mcp",
    version,
    about = "kube-mcp - MCP server exposing kubectl apply/get/describe/delete",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(utils::derive_level(cli.verbose, cli.quiet));

    // Nothing is served unless the kubeconfig resolves.
    let settings = match Settings::from_env(&cli.config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("startup failed: {e:#}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        kubeconfig = %settings.kubeconfig.display(),
        context = settings.context.as_deref().unwrap_or("<current>"),
        kubectl = %settings.kubectl.program,
        timeout_secs = settings.timeout.map(|t| t.as_secs()),
        "starting kube-mcp"
    );

    let server = KubeServer::new(Dispatcher::from_settings(Arc::new(settings)));
    let service = server
        .serve(stdio())
        .await
        .context("Failed to start MCP service on stdio")?;

    let reason = service.waiting().await.context("MCP service task failed")?;
    tracing::info!(?reason, "shutting down");
    Ok(())
}
