/**
 * SURFACE HTTP - Exposition Prometheus de l'exporter
 *
 * RÔLE :
 * Sert la page d'accueil et le chemin de métriques (par défaut /metrics).
 *
 * FONCTIONNEMENT :
 * - GET <chemin>            -> toutes les cibles (registre batch)
 * - GET <chemin>?target=h   -> résout h, l'inscrit comme cible éphémère (ou
 *   rafraîchit son TTL) puis rend cette seule cible
 * - Échec de résolution -> 400, échec d'inscription ou d'encodage -> 500
 * - `target=` vide = scrape batch
 */

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::Registry;
use serde::Deserialize;
use tracing::{error, warn};

use crate::collector::{encode, single_registry, MetricsBridge, VERSION};
use crate::ephemeral::EphemeralRegistry;
use crate::error::ResolveError;
use crate::resolver::Resolve;

/// État unique passé aux handlers Axum
#[derive(Clone)]
pub struct AppState {
    pub bridge: MetricsBridge,
    pub batch: Registry,
    pub ephemeral: EphemeralRegistry,
    pub resolver: Arc<dyn Resolve>,
    pub metrics_path: String,
}

#[derive(Debug, Deserialize)]
struct ScrapeParams {
    target: Option<String>,
}

pub fn build_router(app_state: AppState) -> Router {
    let metrics_path = app_state.metrics_path.clone();
    let router = Router::new().route(&metrics_path, get(scrape));

    // un chemin de métriques "/" remplace la page d'accueil
    let router = if metrics_path != "/" {
        router.route("/", get(index))
    } else {
        router
    };

    router.with_state(app_state)
}

async fn index(State(app): State<AppState>) -> Html<String> {
    Html(format!(
        r#"<!doctype html>
<html>
<head>
    <meta charset="UTF-8">
    <title>ping Exporter (Version {version})</title>
</head>
<body>
    <h1>ping Exporter</h1>
    <p><a href="{path}">Metrics</a></p>
    <h2>More information:</h2>
    <p><a href="https://github.com/czerwonk/ping_exporter">github.com/czerwonk/ping_exporter</a></p>
</body>
</html>
"#,
        version = VERSION,
        path = app.metrics_path,
    ))
}

async fn scrape(State(app): State<AppState>, Query(params): Query<ScrapeParams>) -> Response {
    match params.target.filter(|t| !t.is_empty()) {
        None => exposition(&app.batch),
        Some(host) => scrape_target(&app, &host).await,
    }
}

async fn scrape_target(app: &AppState, host: &str) -> Response {
    let addrs = match app.resolver.lookup(host).await {
        Ok(addrs) => addrs,
        Err(e) => return resolution_failed(e),
    };
    let Some(addr) = addrs.first().copied() else {
        return resolution_failed(ResolveError::NoAddresses(host.to_string()));
    };

    let identity = match app.ephemeral.touch(host, addr) {
        Ok(identity) => identity,
        Err(e) => {
            error!("cannot add target {}: {}", host, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let registry = match app.bridge.single_collector(identity).and_then(single_registry) {
        Ok(registry) => registry,
        Err(e) => {
            error!("cannot build collector for {}: {}", host, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    exposition(&registry)
}

fn resolution_failed(e: ResolveError) -> Response {
    warn!("{}", e);
    (StatusCode::BAD_REQUEST, e.to_string()).into_response()
}

fn exposition(registry: &Registry) -> Response {
    match encode(registry) {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            error!("cannot encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
