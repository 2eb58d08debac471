//! Doublures de test : moteur de ping et résolveur scriptés

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::engine::{Metrics, ProbeEngine, ProbeIdentity, Snapshot};
use crate::error::{EngineError, ResolveError};
use crate::resolver::Resolve;

/// Moteur en mémoire : enregistre les appels, métriques réglables à la main
#[derive(Default)]
pub struct FakeEngine {
    probes: Mutex<Snapshot>,
    registrations: Mutex<Vec<(ProbeIdentity, Duration)>>,
    deregistrations: Mutex<Vec<ProbeIdentity>>,
    fail_registrations: Mutex<bool>,
    hide_export: Mutex<bool>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_metrics(&self, identity: &ProbeIdentity, metrics: Metrics) {
        self.probes.lock().insert(identity.clone(), metrics);
    }

    pub fn fail_registrations(&self, fail: bool) {
        *self.fail_registrations.lock() = fail;
    }

    /// Simule un export vide transitoire
    pub fn hide_export(&self, hide: bool) {
        *self.hide_export.lock() = hide;
    }

    pub fn is_registered(&self, identity: &ProbeIdentity) -> bool {
        self.probes.lock().contains_key(identity)
    }

    pub fn registered(&self) -> Vec<ProbeIdentity> {
        self.probes.lock().keys().cloned().collect()
    }

    pub fn registrations(&self) -> Vec<(ProbeIdentity, Duration)> {
        self.registrations.lock().clone()
    }

    pub fn deregistrations(&self) -> Vec<ProbeIdentity> {
        self.deregistrations.lock().clone()
    }
}

impl ProbeEngine for FakeEngine {
    fn register(&self, identity: ProbeIdentity, delay: Duration) -> Result<(), EngineError> {
        if *self.fail_registrations.lock() {
            return Err(EngineError::Transport(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "raw socket refused",
            )));
        }
        self.registrations.lock().push((identity.clone(), delay));
        self.probes.lock().entry(identity).or_default();
        Ok(())
    }

    fn deregister(&self, identity: &ProbeIdentity) {
        self.deregistrations.lock().push(identity.clone());
        self.probes.lock().remove(identity);
    }

    fn export(&self) -> Snapshot {
        if *self.hide_export.lock() {
            return Snapshot::new();
        }
        self.probes.lock().clone()
    }

    fn probe_count(&self) -> usize {
        self.probes.lock().len()
    }
}

/// Résolveur à réponses fixes ; un nom inconnu échoue comme un NXDOMAIN
#[derive(Default)]
pub struct FakeResolver {
    answers: Mutex<HashMap<String, Vec<IpAddr>>>,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, host: &str, addrs: &[&str]) {
        let addrs = addrs.iter().map(|a| a.parse().expect("test address")).collect();
        self.answers.lock().insert(host.to_string(), addrs);
    }

    pub fn forget(&self, host: &str) {
        self.answers.lock().remove(host);
    }
}

#[async_trait]
impl Resolve for FakeResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        match self.answers.lock().get(host) {
            Some(addrs) if addrs.is_empty() => Err(ResolveError::NoAddresses(host.to_string())),
            Some(addrs) => Ok(addrs.clone()),
            None => Err(ResolveError::Lookup {
                host: host.to_string(),
                message: "no such host".to_string(),
            }),
        }
    }
}

pub fn identity(host: &str, addr: &str) -> ProbeIdentity {
    ProbeIdentity::new(host, addr.parse().expect("test address"))
}

/// Laisse tourner les tâches prêtes (timers expirés en temps figé)
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
