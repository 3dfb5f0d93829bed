//! relaygate site administration
//!
//! Manages the relay CA and the relay registry of a site, and can push a
//! monitoring payload into the monitoring core socket by hand.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tonic::Request;
use tracing::info;

use relaygate_core::SiteConfig;
use relaygate_crypto::{CaBundle, generate_ca};
use relaygate_site::ControlPlane;
use relaygate_site::server::messages::{
    ListRelaysRequest, RegisterRelayRequest, UnregisterRelayRequest,
};

#[derive(Parser, Debug)]
#[command(name = "relaygate")]
#[command(version, about = "relaygate site control plane administration")]
struct Args {
    /// Site config file (defaults to $XDG_CONFIG_HOME/relaygate/settings.json).
    #[arg(long, env = "RELAYGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the relay CA in the configured CA directory.
    InitCa {
        /// Organisation name used in the CA subject.
        #[arg(long, default_value = "relaygate")]
        org: String,

        /// Replace an existing CA. Certificates it issued stop validating.
        #[arg(long)]
        force: bool,
    },

    /// Register a relay and issue its client certificate.
    Register {
        #[arg(long)]
        relay_id: String,

        #[arg(long)]
        alias: String,

        /// PEM CSR whose subject CN equals the relay id.
        #[arg(long)]
        csr: PathBuf,

        /// Certificate expiry as a Unix timestamp (capped at three months).
        #[arg(long)]
        not_after: Option<i64>,

        /// Write the client certificate here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Remove a relay together with its tasks and certificate records.
    Unregister {
        #[arg(long)]
        relay_id: String,
    },

    /// List registered relays.
    Relays,

    /// Send a payload file to the monitoring core socket.
    Forward {
        #[arg(long)]
        host: String,

        #[arg(long, default_value = "")]
        service: String,

        #[arg(long)]
        serial: String,

        /// Fetch start as a Unix timestamp (defaults to now).
        #[arg(long)]
        timestamp: Option<i64>,

        #[arg(long)]
        payload: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    relaygate_core::tracing_init::init_tracing("relaygate_site=info", args.log_json);

    let config = SiteConfig::load(args.config.as_deref()).context("Failed to load site config")?;

    match args.command {
        Command::InitCa { org, force } => init_ca(&config, &org, force),
        Command::Register {
            relay_id,
            alias,
            csr,
            not_after,
            out,
        } => {
            let plane = ControlPlane::open(config).await?;
            let csr = std::fs::read_to_string(&csr)
                .with_context(|| format!("Failed to read CSR {}", csr.display()))?;
            let resp = plane
                .registration_service()
                .register(Request::new(RegisterRelayRequest {
                    relay_id,
                    alias,
                    csr,
                    requested_not_after: not_after,
                }))
                .await
                .map_err(|s| anyhow::anyhow!("Registration failed: {}", s.message()))?
                .into_inner();

            info!(relay_id = %resp.relay_id, not_after = resp.not_valid_after, "Relay registered");
            match out {
                Some(path) => std::fs::write(&path, &resp.client_cert)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => write!(std::io::stdout(), "{}", resp.client_cert)?,
            }
            Ok(())
        }
        Command::Unregister { relay_id } => {
            let plane = ControlPlane::open(config).await?;
            plane
                .registration_service()
                .unregister(Request::new(UnregisterRelayRequest { relay_id }))
                .await
                .map_err(|s| anyhow::anyhow!("Unregistration failed: {}", s.message()))?;
            Ok(())
        }
        Command::Relays => {
            let plane = ControlPlane::open(config).await?;
            let relays = plane
                .registration_service()
                .list_relays(Request::new(ListRelaysRequest::default()))
                .await
                .map_err(|s| anyhow::anyhow!("Listing relays failed: {}", s.message()))?
                .into_inner()
                .relays;

            let mut stdout = std::io::stdout().lock();
            for relay in relays {
                writeln!(
                    stdout,
                    "{}\t{}\tregistered={}\tlast_seen={}",
                    relay.relay_id, relay.alias, relay.registered_at, relay.last_seen
                )?;
            }
            Ok(())
        }
        Command::Forward {
            host,
            service,
            serial,
            timestamp,
            payload,
        } => {
            let plane = ControlPlane::open(config).await?;
            let data = std::fs::read(&payload)
                .with_context(|| format!("Failed to read payload {}", payload.display()))?;
            let timestamp = timestamp.unwrap_or_else(relaygate_core::db::unix_timestamp);

            let written = plane
                .forwarder()
                .process(&data, &host, &serial, timestamp, &service)
                .await?;
            writeln!(std::io::stdout(), "{written} bytes sent")?;
            Ok(())
        }
    }
}

fn init_ca(config: &SiteConfig, org: &str, force: bool) -> anyhow::Result<()> {
    let dir = config.ca_dir()?;
    if !force && CaBundle::load_from_dir(&dir).is_ok() {
        anyhow::bail!(
            "Relay CA already exists in {} (use --force to replace it)",
            dir.display()
        );
    }

    generate_ca(org)?.write_to_dir(&dir)?;
    info!(ca_dir = %dir.display(), "Relay CA created");
    writeln!(std::io::stdout(), "{}", dir.display())?;
    Ok(())
}
