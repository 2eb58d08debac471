/**
 * CONFIGURATION - Fichier YAML + drapeaux de ligne de commande
 *
 * RÔLE :
 * Construit les réglages d'exécution à partir du fichier `--config.path`
 * (optionnel) et des drapeaux.
 *
 * FONCTIONNEMENT :
 * - Les drapeaux servent de valeurs par défaut : ils ne remplissent que les
 *   champs laissés à zéro par le fichier (liste vide, 0, 0s, chaîne vide)
 * - Sans fichier, tout vient des drapeaux
 * - Toute erreur ici est fatale au démarrage (code de sortie 1)
 */

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::cli::Cli;
use crate::collector::RenderOptions;
use crate::engine::icmp::MonitorSettings;
use crate::error::ConfigError;

pub const MAX_PAYLOAD_SIZE: u16 = 65500;
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
/// Borne des durées : les timers sont armés à `Instant::now() + durée`
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub targets: Vec<String>,
    pub ping: PingConfig,
    pub dns: DnsConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PingConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub history_size: usize,
    pub payload_size: u16,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    #[serde(with = "humantime_serde")]
    pub refresh: Duration,
    pub nameserver: String,
}

impl Config {
    pub fn from_yaml(txt: &str, path: &Path) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(txt).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&txt, path)
    }

    /// Complète les champs restés à zéro avec les valeurs des drapeaux
    pub fn apply_flag_defaults(&mut self, cli: &Cli) {
        if self.targets.is_empty() {
            self.targets = cli.targets.clone();
        }
        if self.ping.interval.is_zero() {
            self.ping.interval = cli.ping_interval;
        }
        if self.ping.timeout.is_zero() {
            self.ping.timeout = cli.ping_timeout;
        }
        if self.ping.history_size == 0 {
            self.ping.history_size = cli.history_size;
        }
        if self.ping.payload_size == 0 {
            self.ping.payload_size = cli.ping_size;
        }
        if self.dns.refresh.is_zero() {
            self.dns.refresh = cli.dns_refresh;
        }
        if self.dns.nameserver.is_empty() {
            self.dns.nameserver = cli.dns_nameserver.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping.history_size < 1 {
            return Err(ConfigError::InvalidHistorySize);
        }
        if self.ping.payload_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::InvalidPayloadSize(self.ping.payload_size));
        }
        if self.ping.interval.is_zero() {
            return Err(ConfigError::InvalidInterval);
        }
        for (field, value) in [
            ("ping.interval", self.ping.interval),
            ("ping.timeout", self.ping.timeout),
            ("dns.refresh", self.dns.refresh),
        ] {
            check_duration(field, value)?;
        }
        Ok(())
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            interval: self.ping.interval,
            timeout: self.ping.timeout,
            payload_size: self.ping.payload_size,
            history_size: self.ping.history_size,
        }
    }
}

/// Réglages d'exécution complets, validés
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    pub listen_address: SocketAddr,
    pub metrics_path: String,
    pub targets_timeout: Duration,
    pub render: RenderOptions,
}

impl Settings {
    pub async fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config_path {
            Some(path) => Some(Config::load(path).await?),
            None => None,
        };
        Self::build(cli, file)
    }

    pub fn build(cli: &Cli, file: Option<Config>) -> Result<Self, ConfigError> {
        let mut config = file.unwrap_or_default();
        config.apply_flag_defaults(cli);
        config.validate()?;
        let targets_timeout = Duration::from_secs(cli.targets_timeout);
        check_duration("targets.timeout", targets_timeout)?;

        Ok(Self {
            config,
            listen_address: parse_listen_address(&cli.listen_address)?,
            metrics_path: normalize_metrics_path(&cli.metrics_path),
            targets_timeout,
            render: RenderOptions {
                rtt_unit: cli.rtt_unit,
                deprecated: cli.metrics_deprecated.enabled(),
            },
        })
    }
}

fn check_duration(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value > MAX_DURATION {
        return Err(ConfigError::DurationTooLong(field));
    }
    Ok(())
}

pub fn normalize_metrics_path(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        warn!("web.telemetry-path is empty, correcting to `{}`", DEFAULT_METRICS_PATH);
        return DEFAULT_METRICS_PATH.to_string();
    }
    if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{}", raw)
    }
}

/// `:9427` écoute sur toutes les interfaces IPv4 ; les noms d'hôte sont résolus
pub fn parse_listen_address(raw: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = if raw.starts_with(':') {
        format!("0.0.0.0{}", raw)
    } else {
        raw.to_string()
    };

    if let Ok(addr) = candidate.parse::<SocketAddr>() {
        return Ok(addr);
    }
    candidate
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidListenAddress(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;

    use super::*;
    use crate::collector::RttUnit;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["ping_exporter"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    const SAMPLE: &str = r#"
targets:
  - example.com
  - 1.1.1.1
ping:
  interval: 2s
  timeout: 3s
  history-size: 42
  payload-size: 120
dns:
  refresh: 2m15s
  nameserver: 1.1.1.1
"#;

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_yaml(SAMPLE, Path::new("test.yaml")).unwrap();

        assert_eq!(config.targets, vec!["example.com", "1.1.1.1"]);
        assert_eq!(config.ping.interval, Duration::from_secs(2));
        assert_eq!(config.ping.timeout, Duration::from_secs(3));
        assert_eq!(config.ping.history_size, 42);
        assert_eq!(config.ping.payload_size, 120);
        assert_eq!(config.dns.refresh, Duration::from_secs(135));
        assert_eq!(config.dns.nameserver, "1.1.1.1");
    }

    #[test]
    fn test_file_values_win_over_flags() {
        let cli = cli(&["--ping.interval=10s", "--ping.history-size=3", "other.example"]);
        let file = Config::from_yaml(SAMPLE, Path::new("test.yaml")).unwrap();

        let settings = Settings::build(&cli, Some(file)).unwrap();

        assert_eq!(settings.config.ping.interval, Duration::from_secs(2));
        assert_eq!(settings.config.ping.history_size, 42);
        assert_eq!(settings.config.targets, vec!["example.com", "1.1.1.1"]);
    }

    #[test]
    fn test_flags_fill_missing_fields() {
        let cli = cli(&["--ping.timeout=1s", "--dns.nameserver=9.9.9.9", "a.example"]);
        let file = Config::from_yaml("ping:\n  interval: 7s\n", Path::new("partial.yaml")).unwrap();

        let settings = Settings::build(&cli, Some(file)).unwrap();
        let config = &settings.config;

        assert_eq!(config.ping.interval, Duration::from_secs(7));
        assert_eq!(config.ping.timeout, Duration::from_secs(1));
        assert_eq!(config.ping.history_size, 10);
        assert_eq!(config.ping.payload_size, 56);
        assert_eq!(config.dns.refresh, Duration::from_secs(60));
        assert_eq!(config.dns.nameserver, "9.9.9.9");
        assert_eq!(config.targets, vec!["a.example"]);
    }

    #[test]
    fn test_flags_only() {
        let cli = cli(&["--metrics.rttunit=s", "--targets.timeout=30", "example.com"]);

        let settings = Settings::build(&cli, None).unwrap();

        assert_eq!(settings.config.targets, vec!["example.com"]);
        assert_eq!(settings.listen_address, "0.0.0.0:9427".parse().unwrap());
        assert_eq!(settings.metrics_path, "/metrics");
        assert_eq!(settings.targets_timeout, Duration::from_secs(30));
        assert_eq!(settings.render.rtt_unit, RttUnit::S);
        assert!(settings.render.deprecated);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            Settings::build(&cli(&["--ping.history-size=0"]), None),
            Err(ConfigError::InvalidHistorySize)
        ));
        assert!(matches!(
            Settings::build(&cli(&["--ping.size=65501"]), None),
            Err(ConfigError::InvalidPayloadSize(65501))
        ));
        assert!(matches!(
            Settings::build(&cli(&["--ping.interval=0s"]), None),
            Err(ConfigError::InvalidInterval)
        ));
        assert!(matches!(
            Settings::build(&cli(&["--web.listen-address=not an address"]), None),
            Err(ConfigError::InvalidListenAddress(_))
        ));
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        assert!(matches!(
            Settings::build(&cli(&["--targets.timeout=18446744073709551615"]), None),
            Err(ConfigError::DurationTooLong("targets.timeout"))
        ));
        assert!(matches!(
            Settings::build(&cli(&["--dns.refresh=500years"]), None),
            Err(ConfigError::DurationTooLong("dns.refresh"))
        ));
        let file = Config::from_yaml("ping:\n  timeout: 2years\n", Path::new("slow.yaml")).unwrap();
        assert!(matches!(
            Settings::build(&cli(&[]), Some(file)),
            Err(ConfigError::DurationTooLong("ping.timeout"))
        ));
        assert!(Settings::build(&cli(&["--dns.refresh=365days"]), None).is_ok());
    }

    #[test]
    fn test_unparsable_file_is_error() {
        let err = Config::from_yaml("ping:\n  interval: soon\n", Path::new("bad.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::from_yaml("  \n", Path::new("empty.yaml")).unwrap(), Config::default());
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.ping.payload_size, 120);

        let missing = Config::load(Path::new("/nonexistent/ping.yaml")).await;
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_metrics_path_normalization() {
        assert_eq!(normalize_metrics_path(""), "/metrics");
        assert_eq!(normalize_metrics_path("probe"), "/probe");
        assert_eq!(normalize_metrics_path("/custom/metrics"), "/custom/metrics");
    }

    #[test]
    fn test_listen_address_forms() {
        assert_eq!(parse_listen_address(":9427").unwrap(), "0.0.0.0:9427".parse().unwrap());
        assert_eq!(parse_listen_address("127.0.0.1:8080").unwrap(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(parse_listen_address("[::1]:9427").unwrap(), "[::1]:9427".parse().unwrap());
        assert!(parse_listen_address("9427").is_err());
    }
}
