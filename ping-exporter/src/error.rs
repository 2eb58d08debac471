/**
 * ERREURS - Taxonomie des erreurs de l'exporter
 *
 * RÔLE : Une enum par domaine (config, DNS, moteur de ping, identité de sonde).
 * Les erreurs de config sont fatales au démarrage ; les autres sont loggées
 * ou converties en code HTTP par la couche web.
 */

use std::path::PathBuf;

/// Erreurs de configuration : toujours fatales avant de servir
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot load config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("ping.history-size must be greater than 0")]
    InvalidHistorySize,
    #[error("ping.size must be between 0 and 65500 (got {0})")]
    InvalidPayloadSize(u16),
    #[error("invalid web.listen-address {0:?}")]
    InvalidListenAddress(String),
    #[error("invalid dns.nameserver {0:?}, expected an IP address with optional port")]
    InvalidNameserver(String),
    #[error("ping.interval must be greater than 0")]
    InvalidInterval,
    #[error("{0} must not exceed 365 days")]
    DurationTooLong(&'static str),
    #[error("invalid log.level {0:?}, valid levels: [debug, info, warn, error, fatal]")]
    InvalidLogLevel(String),
}

/// Échec de résolution d'un nom d'hôte
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("error resolving target {host}: {message}")]
    Lookup { host: String, message: String },
    #[error("cannot resolve target {0}: no addresses returned")]
    NoAddresses(String),
}

/// Erreurs remontées par le moteur de ping
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("cannot start monitoring: {0}")]
    Transport(#[from] std::io::Error),
    #[error("IPv{0} probing is not available on this host")]
    FamilyUnavailable(crate::engine::AddressFamily),
}

/// Identité de sonde mal formée ("<host> <ip> <4|6>")
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("probe identity {0:?} must have exactly three space separated parts")]
    Malformed(String),
    #[error("invalid address {0:?} in probe identity")]
    InvalidAddress(String),
    #[error("invalid address family {0:?} in probe identity")]
    InvalidFamily(String),
}
