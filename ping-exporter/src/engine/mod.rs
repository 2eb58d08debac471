/**
 * MOTEUR DE PING - Frontière entre l'exporter et ce qui sonde
 *
 * RÔLE :
 * Les cibles et le pont métriques ne parlent qu'au trait `ProbeEngine` :
 * inscription / retrait d'une adresse surveillée (`ProbeIdentity`) et export
 * d'un `Snapshot` des statistiques RTT et perte.
 *
 * FONCTIONNEMENT :
 * - Identité = (nom, adresse, famille), forme texte "<host> <ip> <4|6>"
 * - `icmp::IcmpMonitor` est l'implémentation de production
 */

pub mod icmp;

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EngineError, IdentityError};

/// Version IP d'une adresse surveillée, rendue dans le label `ip_version`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AddressFamily::V4 => "4",
            AddressFamily::V6 => "6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Clé d'une adresse surveillée : `(nom, adresse, famille)`.
///
/// La forme texte `"<host> <ip> <4|6>"` relie les gestionnaires de cibles, le
/// moteur et les labels des métriques.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeIdentity {
    pub host: String,
    pub addr: IpAddr,
    pub family: AddressFamily,
}

impl ProbeIdentity {
    pub fn new(host: impl Into<String>, addr: IpAddr) -> Self {
        Self {
            host: host.into(),
            family: AddressFamily::of(&addr),
            addr,
        }
    }

    /// Valeurs des labels dans l'ordre `target`, `ip`, `ip_version`
    pub fn label_values(&self) -> [String; 3] {
        [
            self.host.clone(),
            self.addr.to_string(),
            self.family.label().to_string(),
        ]
    }
}

impl fmt::Display for ProbeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.host, self.addr, self.family)
    }
}

impl FromStr for ProbeIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, ' ').collect();
        let [host, addr, family] = parts.as_slice() else {
            return Err(IdentityError::Malformed(s.to_string()));
        };
        if host.is_empty() {
            return Err(IdentityError::Malformed(s.to_string()));
        }

        let addr: IpAddr = addr
            .parse()
            .map_err(|_| IdentityError::InvalidAddress(addr.to_string()))?;
        let family = match *family {
            "4" => AddressFamily::V4,
            "6" => AddressFamily::V6,
            other => return Err(IdentityError::InvalidFamily(other.to_string())),
        };
        if family != AddressFamily::of(&addr) {
            return Err(IdentityError::InvalidFamily(family.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            addr,
            family,
        })
    }
}

/// Statistiques agrégées d'une identité, calculées par le moteur
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics {
    pub packets_sent: u64,
    pub packets_lost: u64,
    pub best: Duration,
    pub worst: Duration,
    pub mean: Duration,
    pub stddev: Duration,
}

impl Metrics {
    /// Au moins un écho est revenu : les RTT ont un sens
    pub fn has_round_trips(&self) -> bool {
        self.packets_sent > self.packets_lost
    }

    /// Perdus / envoyés dans `[0, 1]` ; rien envoyé = aucune perte
    pub fn loss_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        (self.packets_lost as f64 / self.packets_sent as f64).clamp(0.0, 1.0)
    }
}

/// Copie instantanée de toutes les statistiques, triée par identité
pub type Snapshot = BTreeMap<ProbeIdentity, Metrics>;

/// Composant qui sonde réellement.
///
/// Appelé en concurrence par les cibles statiques, le registre éphémère et le
/// pont métriques.
pub trait ProbeEngine: Send + Sync {
    /// Commence à sonder `identity` après `delay` ; une identité déjà sondée
    /// est ignorée
    fn register(&self, identity: ProbeIdentity, delay: Duration) -> Result<(), EngineError>;

    /// Arrête de sonder `identity` et oublie son historique ; inconnue = no-op
    fn deregister(&self, identity: &ProbeIdentity);

    fn export(&self) -> Snapshot;

    /// Nombre d'identités inscrites, qu'elles aient déjà des résultats ou non
    fn probe_count(&self) -> usize;
}
