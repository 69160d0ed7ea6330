use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use stubnest_server::pipeline::CorrelationFilter;
use stubnest_server::{
    ExtensionRegistration, ServerOptions, TlsConfig, TokioBackend, TransportBackend,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stubnest", about = "Programmable HTTP(S) stub server")]
struct Args {
    /// HTTP listener port (0 = ephemeral)
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// HTTPS listener port; requires --tls-cert and --tls-key
    #[arg(long)]
    https_port: Option<u16>,

    /// Host to bind listeners on
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Admin path prefix
    #[arg(long, default_value = "/__admin")]
    admin_prefix: String,

    /// Worker pool size (0 = number of CPUs)
    #[arg(long, default_value = "0")]
    workers: usize,

    /// TLS certificate file (PEM)
    #[arg(long)]
    tls_cert: Option<String>,

    /// TLS private key file (PEM)
    #[arg(long)]
    tls_key: Option<String>,

    /// Grace period for in-flight requests on shutdown, in seconds
    #[arg(long, default_value = "5")]
    grace_seconds: u64,

    /// Verbose diagnostics
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(if args.verbose { "debug" } else { "info" })
            }),
        )
        .init();

    let mut options = ServerOptions::new()
        .with_http_port(args.port)
        .with_admin_prefix(args.admin_prefix)
        .with_workers(args.workers)
        .with_verbose(args.verbose)
        .with_grace_period(Duration::from_secs(args.grace_seconds))
        .register(ExtensionRegistration::filter(
            "correlation",
            Arc::new(CorrelationFilter),
        ));
    options.bind_host = args.bind;

    if let Some(https_port) = args.https_port {
        let (cert, key) = match (args.tls_cert, args.tls_key) {
            (Some(cert), Some(key)) => (cert, key),
            _ => anyhow::bail!("--https-port requires --tls-cert and --tls-key"),
        };
        options = options.with_https_port(
            https_port,
            TlsConfig {
                cert_path: cert,
                key_path: key,
            },
        );
    }

    let server = TokioBackend::new().start(options).await?;

    tokio::signal::ctrl_c().await?;
    server.stop().await;
    Ok(())
}
