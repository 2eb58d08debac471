//! État partagé entre tâches : snapshot du pont métriques, verrou unique

use parking_lot::Mutex;
use std::sync::Arc;

use crate::engine::Snapshot;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Dernier snapshot non vide, servi quand le moteur n'a rien à exporter
pub fn empty_snapshot() -> Shared<Snapshot> {
    new_state(Snapshot::new())
}
