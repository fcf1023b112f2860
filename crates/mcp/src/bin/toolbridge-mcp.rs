// Standalone MCP server binary

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use toolbridge_core::{
    CatalogBuilder, CredentialInjector, InvocationEngine, MetricsCollector, ServerConfig,
};
use toolbridge_mcp::enhancer::API_KEY_ENV;
use toolbridge_mcp::{
    http_client, Manifest, ManifestSource, McpServer, OpenAiSchemaEnhancer, ServerOptions,
};

#[derive(Parser, Debug)]
#[command(name = "toolbridge-mcp")]
#[command(about = "Expose manifest-declared HTTP operations as MCP tools over stdio", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "TOOLBRIDGE_CONFIG", default_value = "toolbridge.toml")]
    config: PathBuf,

    /// Manifest declaring namespaces and their HTTP bindings
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Preview dangerous calls instead of executing them
    #[arg(long)]
    dry_run: bool,

    /// Expose tools classified as dangerous
    #[arg(long)]
    allow_dangerous: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        ServerConfig::load(Some(&args.config)).context("Failed to load configuration")?;
    if args.dry_run {
        config.dry_run = true;
    }
    if args.allow_dangerous {
        config.allow_dangerous = true;
    }
    if args.manifest.is_some() {
        config.manifest = args.manifest;
    }

    // stdout carries protocol frames, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::info!("toolbridge MCP server starting...");

    let manifest_path = config
        .manifest
        .clone()
        .context("No manifest configured; pass --manifest or set `manifest` in the config file")?;
    let manifest = Manifest::load(&manifest_path)?;
    if config.namespaces.is_empty() {
        config.namespaces = manifest.namespace_names();
    }

    let credentials: Arc<dyn CredentialInjector> = Arc::new(manifest.auth_manager());
    let source = ManifestSource::new(&manifest)?;

    let mut builder = CatalogBuilder::from_config(&config)?.with_credentials(credentials.clone());
    let mut llm_schemas = false;
    if config.use_llm {
        let client = http_client().context("Failed to create HTTP client")?;
        match OpenAiSchemaEnhancer::from_env(client, &config.llm_base_url, &config.llm_model) {
            Some(enhancer) => {
                tracing::info!(model = %config.llm_model, "LLM schema enhancement enabled");
                builder = builder.with_enhancer(Arc::new(enhancer));
                llm_schemas = true;
            }
            None => tracing::warn!(
                "use_llm is set but {} is missing, LLM schema enhancement disabled",
                API_KEY_ENV
            ),
        }
    }

    let catalog = builder.build(&source, &config.namespaces).await;
    tracing::info!("Registered {} tools", catalog.len());

    let engine = InvocationEngine::new(Arc::new(catalog), &config)
        .with_credentials(credentials)
        .with_metrics(Arc::new(MetricsCollector::new()));

    let server = McpServer::new(
        Arc::new(engine),
        ServerOptions {
            strict_arguments: config.strict_arguments,
            llm_schemas,
            ..Default::default()
        },
    );
    server.run(tokio::io::stdin(), tokio::io::stdout()).await
}
