/**
 * MONITEUR ICMP - Implémentation `surge-ping` du moteur de ping
 *
 * RÔLE :
 * Envoie les échos ICMP et calcule les statistiques exportées.
 *
 * FONCTIONNEMENT :
 * - Une tâche tokio par identité inscrite : un écho par `interval`
 * - Les `history_size` derniers résultats sont gardés ; meilleur, pire,
 *   moyenne et écart-type sont calculés sur cette fenêtre à l'export
 * - Un client par famille ; une famille indisponible est désactivée
 */

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{AddressFamily, Metrics, ProbeEngine, ProbeIdentity, Snapshot};
use crate::error::EngineError;

/// Paramètres de sondage communs à toutes les cibles
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub payload_size: u16,
    pub history_size: usize,
}

/// Fenêtre glissante des derniers résultats (None = perdu)
#[derive(Debug)]
struct History {
    results: VecDeque<Option<Duration>>,
    capacity: usize,
}

impl History {
    fn new(capacity: usize) -> Self {
        Self {
            results: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, result: Option<Duration>) {
        if self.results.len() == self.capacity {
            self.results.pop_front();
        }
        self.results.push_back(result);
    }

    fn metrics(&self) -> Metrics {
        let rtts: Vec<f64> = self
            .results
            .iter()
            .flatten()
            .map(Duration::as_secs_f64)
            .collect();
        let sent = self.results.len() as u64;
        let lost = sent - rtts.len() as u64;

        if rtts.is_empty() {
            return Metrics { packets_sent: sent, packets_lost: lost, ..Default::default() };
        }

        let n = rtts.len() as f64;
        let best = rtts.iter().copied().fold(f64::INFINITY, f64::min);
        let worst = rtts.iter().copied().fold(0.0, f64::max);
        let mean = rtts.iter().sum::<f64>() / n;
        let variance = rtts.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

        Metrics {
            packets_sent: sent,
            packets_lost: lost,
            best: Duration::from_secs_f64(best),
            worst: Duration::from_secs_f64(worst),
            mean: Duration::from_secs_f64(mean),
            stddev: Duration::from_secs_f64(variance.sqrt()),
        }
    }
}

struct Probe {
    history: Arc<Mutex<History>>,
    task: JoinHandle<()>,
}

/// [`ProbeEngine`] de production : un client `surge-ping` par famille
pub struct IcmpMonitor {
    v4: Option<Client>,
    v6: Option<Client>,
    settings: MonitorSettings,
    probes: DashMap<ProbeIdentity, Probe>,
    next_identifier: AtomicU16,
}

impl IcmpMonitor {
    /// Ouvre les sockets ICMP ; une famille en échec est désactivée, les deux
    /// en échec = erreur de transport
    pub fn new(settings: MonitorSettings) -> Result<Self, EngineError> {
        let v4 = Client::new(&Config::default());
        let v6 = Client::new(&Config::builder().kind(ICMP::V6).build());

        let (v4, v6) = match (v4, v6) {
            (Err(e), Err(_)) => return Err(EngineError::Transport(e)),
            (v4, v6) => (
                v4.map_err(|e| warn!("IPv4 probing disabled: {}", e)).ok(),
                v6.map_err(|e| warn!("IPv6 probing disabled: {}", e)).ok(),
            ),
        };

        Ok(Self {
            v4,
            v6,
            settings,
            probes: DashMap::new(),
            next_identifier: AtomicU16::new(1),
        })
    }

    fn client_for(&self, family: AddressFamily) -> Option<&Client> {
        match family {
            AddressFamily::V4 => self.v4.as_ref(),
            AddressFamily::V6 => self.v6.as_ref(),
        }
    }

    fn spawn_probe(&self, client: Client, addr: IpAddr, delay: Duration, history: Arc<Mutex<History>>) -> JoinHandle<()> {
        let settings = self.settings.clone();
        let identifier = PingIdentifier(self.next_identifier.fetch_add(1, Ordering::Relaxed));

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let payload = vec![0u8; settings.payload_size as usize];
            let mut pinger = client.pinger(addr, identifier).await;
            pinger.timeout(settings.timeout);

            let mut ticker = tokio::time::interval(settings.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut seq: u16 = 0;

            loop {
                ticker.tick().await;
                let result = match pinger.ping(PingSequence(seq), &payload).await {
                    Ok((_, rtt)) => Some(rtt),
                    Err(e) => {
                        debug!("echo {} to {} failed: {}", seq, addr, e);
                        None
                    }
                };
                seq = seq.wrapping_add(1);
                history.lock().push(result);
            }
        })
    }
}

impl ProbeEngine for IcmpMonitor {
    fn register(&self, identity: ProbeIdentity, delay: Duration) -> Result<(), EngineError> {
        let client = self
            .client_for(identity.family)
            .cloned()
            .ok_or(EngineError::FamilyUnavailable(identity.family))?;

        // L'entrée tient le verrou de shard : deux register concurrents ne
        // peuvent pas lancer deux tâches pour la même identité
        if let dashmap::mapref::entry::Entry::Vacant(slot) = self.probes.entry(identity) {
            let history = Arc::new(Mutex::new(History::new(self.settings.history_size)));
            let task = self.spawn_probe(client, slot.key().addr, delay, history.clone());
            slot.insert(Probe { history, task });
        }
        Ok(())
    }

    fn deregister(&self, identity: &ProbeIdentity) {
        if let Some((_, probe)) = self.probes.remove(identity) {
            probe.task.abort();
        }
    }

    fn export(&self) -> Snapshot {
        self.probes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().history.lock().metrics()))
            .collect()
    }

    fn probe_count(&self) -> usize {
        self.probes.len()
    }
}

impl Drop for IcmpMonitor {
    fn drop(&mut self) {
        for entry in self.probes.iter() {
            entry.value().task.abort();
        }
    }
}
