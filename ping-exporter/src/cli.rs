//! Ligne de commande : mêmes drapeaux pointés que l'exporter historique

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::collector::RttUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    Enable,
    Disable,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::Enable
    }
}

#[derive(Debug, Parser)]
#[command(name = "ping_exporter", version, about = "Prometheus exporter for ICMP echo round trip times")]
pub struct Cli {
    /// Address on which to expose metrics and web interface
    #[arg(long = "web.listen-address", default_value = ":9427")]
    pub listen_address: String,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", default_value = "/metrics")]
    pub metrics_path: String,

    /// Path to config file
    #[arg(long = "config.path")]
    pub config_path: Option<PathBuf>,

    /// Interval for ICMP echo requests
    #[arg(long = "ping.interval", default_value = "5s", value_parser = humantime::parse_duration)]
    pub ping_interval: Duration,

    /// Timeout for ICMP echo request
    #[arg(long = "ping.timeout", default_value = "4s", value_parser = humantime::parse_duration)]
    pub ping_timeout: Duration,

    /// Payload size for ICMP echo requests
    #[arg(long = "ping.size", default_value_t = 56)]
    pub ping_size: u16,

    /// Number of results to remember per target
    #[arg(long = "ping.history-size", default_value_t = 10)]
    pub history_size: usize,

    /// Interval for refreshing DNS records and updating targets accordingly (0 if disabled)
    #[arg(long = "dns.refresh", default_value = "1m", value_parser = humantime::parse_duration)]
    pub dns_refresh: Duration,

    /// DNS server used to resolve hostname of targets
    #[arg(long = "dns.nameserver", default_value = "")]
    pub dns_nameserver: String,

    /// Only log messages with the given severity or above. Valid levels: [debug, info, warn, error, fatal]
    #[arg(long = "log.level", default_value = "info")]
    pub log_level: String,

    /// Timeout in seconds for targets added through the target query parameter
    #[arg(long = "targets.timeout", default_value_t = 10)]
    pub targets_timeout: u64,

    /// Enable or disable the type-labelled rtt metrics
    #[arg(long = "metrics.deprecated", value_enum, default_value = "enable")]
    pub metrics_deprecated: Toggle,

    /// Export ping results as either millis, seconds or both
    #[arg(long = "metrics.rttunit", value_enum, default_value = "ms")]
    pub rtt_unit: RttUnit,

    /// A list of targets to ping
    pub targets: Vec<String>,
}
