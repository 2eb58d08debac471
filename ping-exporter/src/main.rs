/**
 * PING EXPORTER - Point d'entrée
 *
 * RÔLE : Assemble moteur de ping, cibles statiques (DNS synchronisé), cibles
 * éphémères `?target=` et pont métriques derrière un serveur Axum.
 *
 * SORTIE : 1 = erreur d'usage ou de config, 2 = transport ICMP indisponible.
 */

mod cli;
mod collector;
mod config;
mod engine;
mod ephemeral;
mod error;
mod http;
mod logging;
mod resolver;
mod state;
mod targets;
#[cfg(test)]
mod test_support;

use std::fmt::Display;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use prometheus::Registry;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::cli::Cli;
use crate::collector::{MetricsBridge, VERSION};
use crate::config::Settings;
use crate::engine::icmp::IcmpMonitor;
use crate::engine::ProbeEngine;
use crate::ephemeral::EphemeralRegistry;
use crate::http::AppState;
use crate::resolver::{DnsResolver, Resolve};
use crate::targets::TargetManager;

const EXIT_USAGE: i32 = 1;
const EXIT_TRANSPORT: i32 = 2;

#[tokio::main]
async fn main() {
    // .env optionnel
    dotenvy::dotenv().ok();

    let cli = parse_cli();
    if let Err(e) = logging::init_logging(&cli.log_level) {
        usage_error(e);
    }

    let settings = match Settings::from_cli(&cli).await {
        Ok(settings) => settings,
        Err(e) => usage_error(e),
    };
    let resolver = match DnsResolver::from_nameserver(&settings.config.dns.nameserver) {
        Ok(resolver) => resolver,
        Err(e) => usage_error(e),
    };

    info!("starting ping exporter (version {})", VERSION);
    info!("rtt unit: {:?}, dns: {}", settings.render.rtt_unit, resolver.describe());

    let engine: Arc<dyn ProbeEngine> = match IcmpMonitor::new(settings.config.monitor_settings()) {
        Ok(monitor) => Arc::new(monitor),
        Err(e) => {
            error!("{}", e);
            std::process::exit(EXIT_TRANSPORT);
        }
    };

    if let Err(e) = run(settings, engine, Arc::new(resolver)).await {
        error!("{:#}", e);
        std::process::exit(EXIT_USAGE);
    }
}

/// `--help` et `--version` sortent en 0, toute autre erreur de parsing en 1
fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

fn usage_error(e: impl Display) -> ! {
    eprintln!("ping_exporter: error: {}", e);
    std::process::exit(EXIT_USAGE);
}

async fn run(settings: Settings, engine: Arc<dyn ProbeEngine>, resolver: Arc<dyn Resolve>) -> anyhow::Result<()> {
    // cibles statiques + rafraîchissement DNS
    let targets = Arc::new(TargetManager::new(&settings.config.targets, engine.clone(), resolver.clone()));
    targets.start().await;
    targets.clone().spawn_dns_refresh(settings.config.dns.refresh);

    let bridge = MetricsBridge::new(engine.clone(), settings.render);
    let batch = Registry::new();
    batch
        .register(Box::new(bridge.batch_collector()?))
        .context("cannot register ping collector")?;

    let ephemeral = EphemeralRegistry::new(engine, settings.targets_timeout, targets.hosts());

    let app_state = AppState {
        bridge,
        batch,
        ephemeral,
        resolver,
        metrics_path: settings.metrics_path.clone(),
    };
    let app = http::build_router(app_state);

    let addr = settings.listen_address;
    info!("listening on {} (metrics at {})", addr, settings.metrics_path);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot listen on {}", addr))?;
    axum::serve(listener, app).await.context("http server stopped")?;

    Ok(())
}
