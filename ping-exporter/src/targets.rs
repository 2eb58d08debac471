/**
 * CIBLES STATIQUES - Synchronisation des cibles configurées avec le DNS
 *
 * RÔLE :
 * Possède la liste des cibles de la config. Au démarrage, résout chaque nom et
 * enregistre toutes ses adresses auprès du moteur de ping. Ensuite, à chaque
 * tick de `dns.refresh`, re-résout et réconcilie.
 *
 * FONCTIONNEMENT :
 * - Réconciliation = ajouter les adresses nouvelles, retirer celles disparues,
 *   ne pas toucher aux adresses inchangées
 * - Une tâche tokio par cible et par cycle : une cible lente ou en échec DNS
 *   ne retarde pas les autres
 * - Décalage de démarrage de 10ms * index pour étaler les premiers pings
 */

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::engine::{ProbeEngine, ProbeIdentity};
use crate::error::ResolveError;
use crate::resolver::Resolve;

/// Décalage entre deux cibles consécutives au premier enregistrement
pub const START_OFFSET_STEP: Duration = Duration::from_millis(10);

/// Adresses ajoutées / retirées par une réconciliation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<IpAddr>,
    pub removed: Vec<IpAddr>,
}

impl ReconcileReport {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Une cible configurée et les adresses actuellement enregistrées pour elle
#[derive(Debug)]
pub struct Target {
    host: String,
    addresses: Mutex<Vec<IpAddr>>,
    start_offset: Duration,
}

impl Target {
    pub fn new(host: impl Into<String>, start_offset: Duration) -> Self {
        Self {
            host: host.into(),
            addresses: Mutex::new(Vec::new()),
            start_offset,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    #[cfg(test)]
    pub fn start_offset(&self) -> Duration {
        self.start_offset
    }

    /// Adresses enregistrées auprès du moteur, dans l'ordre du résolveur
    #[cfg(test)]
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.addresses.lock().clone()
    }

    pub fn identity_for(&self, addr: IpAddr) -> ProbeIdentity {
        ProbeIdentity::new(self.host.clone(), addr)
    }

    /// Aligne les adresses enregistrées sur une résolution fraîche.
    ///
    /// Une adresse que le moteur refuse n'est pas mémorisée : le cycle suivant
    /// retentera de l'ajouter.
    pub async fn reconcile(
        &self,
        engine: &dyn ProbeEngine,
        resolver: &dyn Resolve,
    ) -> Result<ReconcileReport, ResolveError> {
        let resolved = resolver.lookup(&self.host).await?;

        let mut current = self.addresses.lock();
        let mut report = ReconcileReport::default();
        let mut registered = Vec::with_capacity(resolved.len());

        for addr in &resolved {
            if current.contains(addr) {
                registered.push(*addr);
                continue;
            }
            match engine.register(self.identity_for(*addr), self.start_offset) {
                Ok(()) => {
                    info!("adding target for host {} ({})", self.host, addr);
                    registered.push(*addr);
                    report.added.push(*addr);
                }
                Err(e) => error!("failed to add target for host {} ({}): {}", self.host, addr, e),
            }
        }

        for addr in current.iter().filter(|a| !resolved.contains(a)) {
            info!("removing target for host {} ({})", self.host, addr);
            engine.deregister(&self.identity_for(*addr));
            report.removed.push(*addr);
        }

        *current = registered;
        Ok(report)
    }
}

/// Gestionnaire des cibles issues de la configuration
pub struct TargetManager {
    targets: Vec<Arc<Target>>,
    engine: Arc<dyn ProbeEngine>,
    resolver: Arc<dyn Resolve>,
}

impl TargetManager {
    /// Les doublons de la liste sont ignorés (le premier gagne)
    pub fn new(hosts: &[String], engine: Arc<dyn ProbeEngine>, resolver: Arc<dyn Resolve>) -> Self {
        let mut seen = HashSet::new();
        let targets = hosts
            .iter()
            .filter(|h| seen.insert(h.as_str()))
            .enumerate()
            .map(|(i, host)| Arc::new(Target::new(host.clone(), START_OFFSET_STEP * i as u32)))
            .collect();

        Self { targets, engine, resolver }
    }

    #[cfg(test)]
    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    /// Noms configurés : ils ne deviennent jamais des cibles éphémères
    pub fn hosts(&self) -> HashSet<String> {
        self.targets.iter().map(|t| t.host().to_string()).collect()
    }

    /// Enregistrement initial ; un échec DNS saute la cible sans arrêter le processus
    pub async fn start(&self) {
        let mut addresses = 0;
        for target in &self.targets {
            match target.reconcile(self.engine.as_ref(), self.resolver.as_ref()).await {
                Ok(report) => addresses += report.added.len(),
                Err(e) => error!("{}", e),
            }
        }
        info!("registered {} addresses for {} static targets", addresses, self.targets.len());
    }

    /// Lance une réconciliation indépendante par cible
    pub fn refresh_all(&self) -> Vec<JoinHandle<()>> {
        info!("refreshing DNS");
        self.targets
            .iter()
            .map(|target| {
                let target = target.clone();
                let engine = self.engine.clone();
                let resolver = self.resolver.clone();
                tokio::spawn(async move {
                    match target.reconcile(engine.as_ref(), resolver.as_ref()).await {
                        Ok(report) if report.is_unchanged() => {}
                        Ok(report) => debug!(
                            "dns refresh for {}: {} added, {} removed",
                            target.host(),
                            report.added.len(),
                            report.removed.len()
                        ),
                        Err(e) => error!("could not refresh dns: {}", e),
                    }
                })
            })
            .collect()
    }

    /// Démarre le rafraîchissement DNS périodique (`interval` nul = désactivé)
    pub fn spawn_dns_refresh(self: Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            info!("DNS refresh disabled");
            return None;
        }

        // premier tick après un intervalle complet, pas immédiatement
        let start = tokio::time::Instant::now() + interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, interval);

            loop {
                ticker.tick().await;
                self.refresh_all();
            }
        }))
    }
}
