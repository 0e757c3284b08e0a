//! portmesh - service port registry CLI
//!
//! Allocates, inspects and clears the per-directory port map, and runs a
//! service's bootstrap path (`serve`) end to end.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{debug, info, warn};

use portmesh_core::logging::init_logging;
use portmesh_core::{PortSource, RegistryConfig, ServiceBootstrap, ServiceRegistry};

#[derive(Parser)]
#[command(name = "portmesh")]
#[command(version)]
#[command(about = "Dynamic port allocation and service registry", long_about = None)]
struct Cli {
    /// Directory holding the persisted port map
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,
    /// Service list (YAML); defaults to <dir>/portmesh.yaml if present
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Hold an advisory lock while writing the port map
    #[arg(long, global = true)]
    lock: bool,
    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate ports for every configured service
    Init,
    /// Show current assignments
    Show,
    /// Print the port assigned to a service
    Get {
        /// Service name (e.g., api-gateway)
        service: String,
    },
    /// Print the URL of a service
    Url {
        /// Service name
        service: String,
        /// Path appended to the origin (e.g., /api/health)
        #[arg(default_value = "")]
        path: String,
    },
    /// Allocate a port for one additional service
    Allocate {
        /// Service name
        service: String,
        /// Preferred base port
        #[arg(long)]
        start: u16,
    },
    /// Forget all assignments and delete the port map
    Clear,
    /// Run a service's startup path and listen until Ctrl-C
    Serve {
        /// Service name
        service: String,
        /// Preferred base port for a service outside the configured list
        #[arg(long)]
        start: Option<u16>,
    },
}

fn open_registry(cli: &Cli) -> anyhow::Result<ServiceRegistry> {
    let dir = if cli.dir.is_absolute() {
        cli.dir.clone()
    } else {
        std::env::current_dir()?.join(&cli.dir)
    };

    let mut config = RegistryConfig::load_or_default(&dir, cli.config.as_deref())
        .context("Failed to load registry config")?;
    config.lock |= cli.lock;

    ServiceRegistry::new(&dir, &config).context("Invalid registry config")
}

fn print_ports(registry: &ServiceRegistry) {
    let table = registry.display_ports();
    let mut lines = table.lines();
    if let Some(title) = lines.next() {
        println!("{}", title.bold());
    }
    for line in lines {
        println!("{}", line);
    }
}

async fn serve(mut registry: ServiceRegistry, service: &str, start: Option<u16>) -> anyhow::Result<()> {
    let in_list = registry.services().iter().any(|c| c.service == service);

    let resolved = if in_list {
        ServiceBootstrap::start(&mut registry, service)
    } else {
        if let Some(start) = start {
            registry.find_port_for_service(service, start)?;
        }
        ServiceBootstrap::resolve(&registry, service)
    };
    let boot = resolved.with_context(|| format!("Startup aborted for {}", service))?;

    if boot.port_source() == PortSource::Fallback {
        warn!(service, port = boot.listen_port(), "listening on hardcoded default port");
    }
    for (peer, url) in boot.peers() {
        info!(peer = %peer, url = %url, "peer");
    }

    let listener = boot.bind().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(service, "shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((_stream, addr)) => debug!(%addr, "accepted connection"),
                Err(e) => warn!("accept failed: {}", e),
            },
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut registry = open_registry(&cli)?;

    match cli.command {
        Commands::Init => {
            registry.initialize_ports().context("Port allocation failed")?;
            println!("{} ports allocated", "✓".green());
            print_ports(&registry);
        }

        Commands::Show => {
            print_ports(&registry);
        }

        Commands::Get { service } => {
            let port = registry
                .get_port(&service)
                .ok_or_else(|| anyhow!("No port assigned to service: {}", service))?;
            println!("{}", port);
        }

        Commands::Url { service, path } => {
            println!("{}", registry.get_service_url(&service, &path)?);
        }

        Commands::Allocate { service, start } => {
            let port = registry
                .find_port_for_service(&service, start)
                .with_context(|| format!("Port allocation failed for {}", service))?;
            println!("{} {} → {}", "✓".green(), service, port);
        }

        Commands::Clear => {
            registry.clear_port_config()?;
            println!("{} port config cleared", "✓".green());
        }

        Commands::Serve { service, start } => {
            serve(registry, &service, start).await?;
        }
    }

    Ok(())
}
