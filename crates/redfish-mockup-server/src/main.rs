//! Command-line entry point.

use clap::Parser;
use redfish_mockup_server::config::{ServerConfig, TlsConfig};
use redfish_mockup_server::path::ResourcePath;
use redfish_mockup_server::server::MockServer;
use redfish_mockup_server::ssdp::SsdpResponder;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};

/// Serve a recorded Redfish mockup directory over HTTP.
#[derive(Parser, Debug)]
#[command(name = "redfish-mockup-server", version, about)]
struct Args {
    /// Address to listen on
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short = 'p', long, default_value_t = 8000)]
    port: u16,

    /// Root directory of the mockup tree (defaults to the current directory)
    #[arg(short = 'D', long = "dir", env = "MOCKUP_DIR")]
    dir: Option<PathBuf>,

    /// The mockup tree starts at the service root instead of redfish/v1/
    #[arg(short = 'S', long = "short-form")]
    short_form: bool,

    /// Emit per-resource headers.json response headers
    #[arg(short = 'X', long = "headers")]
    headers: bool,

    /// Fixed response delay in seconds
    #[arg(short = 't', long = "time", default_value_t = 0.0)]
    time: f64,

    /// Read per-resource response delays from time.json files
    #[arg(short = 'T', long = "time-from-json")]
    time_from_json: bool,

    /// Serve canned ETags on the well-known ETag test resources
    #[arg(short = 'E', long = "test-etag")]
    test_etag: bool,

    /// Serve HTTPS
    #[arg(short = 's', long = "ssl", requires = "cert", requires = "key")]
    ssl: bool,

    /// TLS certificate chain, PEM format
    #[arg(long)]
    cert: Option<PathBuf>,

    /// TLS private key, PEM format
    #[arg(long)]
    key: Option<PathBuf>,

    /// Answer SSDP discovery searches for the Redfish service type
    #[arg(short = 'P', long = "ssdp")]
    ssdp: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let mock_dir = match args.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let tls = if args.ssl {
        match (args.cert, args.key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path,
                key_path,
            }),
            // clap enforces this pairing; keep a real error for direct callers
            _ => anyhow::bail!("--ssl requires both --cert and --key"),
        }
    } else {
        None
    };

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        mock_dir,
        short_form: args.short_form,
        emit_headers: args.headers,
        default_delay_secs: args.time,
        per_resource_delay: args.time_from_json,
        test_etag: args.test_etag,
        tls,
        ssdp: args.ssdp,
    };
    config.validate()?;

    info!("Redfish Mockup Server {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Mockup form: {}",
        if config.short_form { "short" } else { "tall" }
    );
    if config.emit_headers {
        info!("Emitting response headers from headers.json files");
    }
    if config.per_resource_delay {
        info!("Reading response delays from time.json files");
    } else if config.default_delay_secs > 0.0 {
        info!("Fixed response delay: {}s", config.default_delay_secs);
    }

    let server = MockServer::bind(config.clone())?;
    let addr = server.local_addr()?;
    if config.ssdp {
        spawn_ssdp_responder(&server, &config, addr)?;
    }

    server.run().await
}

/// Start the SSDP responder on its own task. The advertised UUID comes from
/// the mockup's service root document; refusing to start beats advertising
/// a service identity we do not have.
fn spawn_ssdp_responder(
    server: &MockServer,
    config: &ServerConfig,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let root = ResourcePath::resolve("/redfish/v1", config.short_form);
    let document = server
        .repository()
        .resolve(&root)
        .map_err(|e| anyhow::anyhow!("Cannot read service root for SSDP: {e}"))?
        .into_document()
        .ok_or_else(|| anyhow::anyhow!("SSDP requires a service root document in the mockup"))?;
    let uuid = document
        .get("UUID")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("SSDP requires a UUID in the service root document"))?
        .to_string();

    let location = format!(
        "{}://{}:{}/redfish/v1",
        config.scheme(),
        config.host,
        addr.port()
    );
    let responder = SsdpResponder::bind(&uuid, &location)?;
    tokio::spawn(async move {
        if let Err(e) = responder.run().await {
            error!(error = %e, "SSDP responder stopped");
        }
    });
    Ok(())
}
