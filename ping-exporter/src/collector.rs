/**
 * PONT MÉTRIQUES - Moteur de ping -> collecteur Prometheus
 *
 * RÔLE :
 * Tire un snapshot du moteur à chaque scrape et le rend en familles de
 * métriques Prometheus, soit pour toutes les cibles (mode batch), soit pour une
 * seule identité (réponse à `?target=`).
 *
 * FONCTIONNEMENT :
 * - Un seul Mutex partagé par les deux modes couvre l'export ET le rendu :
 *   un scrape voit un snapshot cohérent, deux scrapes ne s'entrelacent pas
 * - Export vide alors que des sondes sont inscrites => on garde le dernier
 *   snapshot non vide ; plus aucune sonde inscrite => le cache est vidé
 * - Perte = perdus / envoyés (0 si rien envoyé) ; les RTT ne sont émis que si
 *   au moins un écho est revenu
 * - Unité des RTT (ms, s, les deux) et famille dépréciée `rtt{type=...}`
 *   configurables
 */

use std::sync::Arc;
use std::time::Duration;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use tracing::error;

use crate::engine::{Metrics, ProbeEngine, ProbeIdentity, Snapshot};
use crate::state::{empty_snapshot, Shared};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const NAMESPACE: &str = "ping";
const LABELS: [&str; 3] = ["target", "ip", "ip_version"];
const DEPRECATED_LABELS: [&str; 4] = ["target", "ip", "ip_version", "type"];

/// Unité d'export des RTT
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RttUnit {
    /// millisecondes (`*_ms`)
    Ms,
    /// secondes (`*_seconds`)
    S,
    /// les deux côte à côte, pour les migrations
    Both,
}

impl RttUnit {
    fn millis(self) -> bool {
        matches!(self, RttUnit::Ms | RttUnit::Both)
    }

    fn seconds(self) -> bool {
        matches!(self, RttUnit::S | RttUnit::Both)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub rtt_unit: RttUnit,
    pub deprecated: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { rtt_unit: RttUnit::Ms, deprecated: true }
    }
}

/// Ce que rend un collecteur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Single(ProbeIdentity),
}

/// Accès au moteur partagé par tous les collecteurs : le Mutex du cache est
/// l'unique domaine d'exclusion des rendus.
#[derive(Clone)]
pub struct MetricsBridge {
    engine: Arc<dyn ProbeEngine>,
    cache: Shared<Snapshot>,
    options: RenderOptions,
}

impl MetricsBridge {
    pub fn new(engine: Arc<dyn ProbeEngine>, options: RenderOptions) -> Self {
        Self {
            engine,
            cache: empty_snapshot(),
            options,
        }
    }

    pub fn batch_collector(&self) -> prometheus::Result<PingCollector> {
        PingCollector::new(self.clone(), Scope::All)
    }

    pub fn single_collector(&self, identity: ProbeIdentity) -> prometheus::Result<PingCollector> {
        PingCollector::new(self.clone(), Scope::Single(identity))
    }
}

/// Une statistique RTT déclinée en secondes et/ou millisecondes
struct ScaledGauge {
    seconds: Option<GaugeVec>,
    millis: Option<GaugeVec>,
}

impl ScaledGauge {
    fn new(name: &str, help: &str, labels: &[&str], unit: RttUnit) -> prometheus::Result<Self> {
        let seconds = unit
            .seconds()
            .then(|| gauge_vec(&format!("{}_seconds", name), &format!("{} in seconds", help), labels))
            .transpose()?;
        let millis = unit
            .millis()
            .then(|| gauge_vec(&format!("{}_ms", name), &format!("{} in millis", help), labels))
            .transpose()?;
        Ok(Self { seconds, millis })
    }

    fn set(&self, labels: &[&str], value: Duration) {
        if let Some(g) = &self.seconds {
            g.with_label_values(labels).set(value.as_secs_f64());
        }
        if let Some(g) = &self.millis {
            g.with_label_values(labels).set(value.as_nanos() as f64 / 1e6);
        }
    }

    fn vecs(&self) -> impl Iterator<Item = &GaugeVec> {
        self.seconds.iter().chain(self.millis.iter())
    }
}

fn gauge_vec(name: &str, help: &str, labels: &[&str]) -> prometheus::Result<GaugeVec> {
    GaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)
}

struct Gauges {
    up: Gauge,
    loss: GaugeVec,
    rtt: Option<ScaledGauge>,
    best: ScaledGauge,
    worst: ScaledGauge,
    mean: ScaledGauge,
    stddev: ScaledGauge,
}

impl Gauges {
    fn new(options: RenderOptions) -> prometheus::Result<Self> {
        let unit = options.rtt_unit;
        let rtt = if options.deprecated {
            Some(ScaledGauge::new("rtt", "Round trip time", &DEPRECATED_LABELS, unit)?)
        } else {
            None
        };

        Ok(Self {
            up: Gauge::with_opts(
                Opts::new("up", "ping_exporter version")
                    .namespace(NAMESPACE)
                    .const_label("version", VERSION),
            )?,
            loss: gauge_vec("loss_percent", "Packet loss in percent", &LABELS)?,
            rtt,
            best: ScaledGauge::new("rtt_best", "Best round trip time", &LABELS, unit)?,
            worst: ScaledGauge::new("rtt_worst", "Worst round trip time", &LABELS, unit)?,
            mean: ScaledGauge::new("rtt_mean", "Mean round trip time", &LABELS, unit)?,
            stddev: ScaledGauge::new("rtt_std_deviation", "Standard deviation", &LABELS, unit)?,
        })
    }

    fn vecs(&self) -> impl Iterator<Item = &GaugeVec> {
        std::iter::once(&self.loss)
            .chain(self.rtt.iter().flat_map(ScaledGauge::vecs))
            .chain(self.best.vecs())
            .chain(self.worst.vecs())
            .chain(self.mean.vecs())
            .chain(self.stddev.vecs())
    }

    fn reset(&self) {
        self.vecs().for_each(|v| v.reset());
    }

    fn observe(&self, identity: &ProbeIdentity, metrics: &Metrics) {
        let values = identity.label_values();
        let labels: Vec<&str> = values.iter().map(String::as_str).collect();

        if metrics.has_round_trips() {
            if let Some(rtt) = &self.rtt {
                for (kind, value) in [
                    ("best", metrics.best),
                    ("worst", metrics.worst),
                    ("mean", metrics.mean),
                    ("std_dev", metrics.stddev),
                ] {
                    let mut typed = labels.clone();
                    typed.push(kind);
                    rtt.set(&typed, value);
                }
            }

            self.best.set(&labels, metrics.best);
            self.worst.set(&labels, metrics.worst);
            self.mean.set(&labels, metrics.mean);
            self.stddev.set(&labels, metrics.stddev);
        }

        self.loss.with_label_values(&labels).set(metrics.loss_ratio());
    }
}

/// Collecteur Prometheus : même logique de rendu pour les deux scopes
pub struct PingCollector {
    bridge: MetricsBridge,
    scope: Scope,
    gauges: Gauges,
}

impl PingCollector {
    fn new(bridge: MetricsBridge, scope: Scope) -> prometheus::Result<Self> {
        let gauges = Gauges::new(bridge.options)?;
        Ok(Self { bridge, scope, gauges })
    }
}

impl Collector for PingCollector {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = self.gauges.up.desc();
        descs.extend(self.gauges.vecs().flat_map(|v| v.desc()));
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        // verrou tenu pendant l'export et tout le rendu
        let mut cache = self.bridge.cache.lock();
        let fresh = self.bridge.engine.export();
        // vide alors que des sondes sont inscrites = export transitoire
        if !fresh.is_empty() || self.bridge.engine.probe_count() == 0 {
            *cache = fresh;
        }

        self.gauges.reset();
        match &self.scope {
            Scope::All => {
                for (identity, metrics) in cache.iter() {
                    self.gauges.observe(identity, metrics);
                }
            }
            Scope::Single(identity) => match cache.get(identity) {
                Some(metrics) => self.gauges.observe(identity, metrics),
                None => {
                    error!("no metrics found for {}", identity);
                    return Vec::new();
                }
            },
        }
        self.gauges.up.set(1.0);

        let mut families = self.gauges.up.collect();
        families.extend(self.gauges.vecs().flat_map(|v| v.collect()));
        families
    }
}

/// Encode un registre au format texte Prometheus
pub fn encode(registry: &Registry) -> prometheus::Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

/// Registre éphémère contenant un seul collecteur (scrape `?target=`)
pub fn single_registry(collector: PingCollector) -> prometheus::Result<Registry> {
    let registry = Registry::new();
    registry.register(Box::new(collector))?;
    Ok(registry)
}
