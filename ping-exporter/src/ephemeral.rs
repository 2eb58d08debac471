/**
 * CIBLES ÉPHÉMÈRES - Cibles ajoutées à la demande par `?target=<host>`
 *
 * RÔLE :
 * Un scrape qui nomme une cible inconnue l'ajoute au moteur de ping ; la cible
 * reste surveillée tant qu'elle est scrapée au moins une fois par fenêtre
 * `targets.timeout`, puis elle est retirée automatiquement.
 *
 * FONCTIONNEMENT :
 * - DashMap hostname -> entrée (identité enregistrée + timer d'expiration)
 * - Chaque requête remplace le timer (expiration glissante) : l'ancien est
 *   annulé dans le même verrou de shard, jamais deux timers vivants par nom
 * - Numéro de génération : un timer périmé qui se déclenche quand même ne
 *   retire pas une entrée plus récente
 * - Les noms de la config statique ne deviennent jamais éphémères
 */

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::{ProbeEngine, ProbeIdentity};
use crate::error::EngineError;

/// Une cible à la demande doit pinger au plus vite
pub const EPHEMERAL_START_DELAY: Duration = Duration::from_millis(1);

struct EphemeralEntry {
    identity: ProbeIdentity,
    generation: u64,
    expiry: JoinHandle<()>,
}

struct Inner {
    entries: DashMap<String, EphemeralEntry>,
    engine: Arc<dyn ProbeEngine>,
    static_hosts: HashSet<String>,
    ttl: Duration,
    next_generation: AtomicU64,
}

/// Registre des cibles éphémères, clonable (état partagé)
#[derive(Clone)]
pub struct EphemeralRegistry {
    inner: Arc<Inner>,
}

impl EphemeralRegistry {
    pub fn new(engine: Arc<dyn ProbeEngine>, ttl: Duration, static_hosts: HashSet<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                engine,
                static_hosts,
                ttl,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Enregistre ou rafraîchit `host`, résolu en `addr` (première adresse).
    ///
    /// Retourne l'identité à rendre pour ce scrape. Un nom statique est
    /// seulement traduit en identité, sans entrée ni timer.
    pub fn touch(&self, host: &str, addr: IpAddr) -> Result<ProbeIdentity, EngineError> {
        if self.inner.static_hosts.contains(host) {
            return Ok(ProbeIdentity::new(host, addr));
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        match self.inner.entries.entry(host.to_string()) {
            MapEntry::Vacant(slot) => {
                let identity = ProbeIdentity::new(host, addr);
                self.inner.engine.register(identity.clone(), EPHEMERAL_START_DELAY)?;
                info!("Adding target: {}", host);

                let expiry = self.spawn_expiry(host.to_string(), generation);
                slot.insert(EphemeralEntry { identity: identity.clone(), generation, expiry });
                Ok(identity)
            }
            MapEntry::Occupied(mut slot) => {
                // rafraîchissement, pas une expiration : pas de nettoyage
                let entry = slot.get_mut();
                entry.expiry.abort();
                entry.generation = generation;
                entry.expiry = self.spawn_expiry(host.to_string(), generation);
                debug!("Refreshed target: {}", host);
                Ok(entry.identity.clone())
            }
        }
    }

    fn spawn_expiry(&self, host: String, generation: u64) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let deadline = tokio::time::Instant::now() + inner.ttl;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            inner.expire(&host, generation);
        })
    }

    #[cfg(test)]
    pub fn contains(&self, host: &str) -> bool {
        self.inner.entries.contains_key(host)
    }

    /// Identité enregistrée pour `host`, si la cible est vivante
    #[cfg(test)]
    pub fn identity(&self, host: &str) -> Option<ProbeIdentity> {
        self.inner.entries.get(host).map(|e| e.identity.clone())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

impl Inner {
    /// Retire l'entrée seulement si elle appartient encore à ce timer
    fn expire(&self, host: &str, generation: u64) {
        let removed = self.entries.remove_if(host, |_, entry| entry.generation == generation);
        if let Some((_, entry)) = removed {
            info!("Removing timed out target: {}", host);
            self.engine.deregister(&entry.identity);
        }
    }
}
