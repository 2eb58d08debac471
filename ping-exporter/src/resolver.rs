/**
 * RÉSOLUTION - Noms d'hôte des cibles -> adresses IP
 *
 * RÔLE :
 * Résolveur système, ou résolveur `trust-dns` épinglé sur un seul serveur
 * (UDP) quand `dns.nameserver` est défini.
 *
 * FONCTIONNEMENT :
 * - Un littéral IP est rendu tel quel, sans requête
 * - A et AAAA dans les deux modes, doublons retirés, ordre du résolveur conservé
 * - Aucun cache ici
 */

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use trust_dns_resolver::config::{LookupIpStrategy, NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

use crate::error::{ConfigError, ResolveError};

const DNS_PORT: u16 = 53;

/// Tout ce qui sait traduire un nom d'hôte en adresses
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Adresses actuelles de `host`, dans l'ordre du résolveur, jamais vide
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError>;
}

pub enum DnsResolver {
    System,
    Pinned {
        nameserver: SocketAddr,
        resolver: TokioAsyncResolver,
    },
}

impl DnsResolver {
    /// Résolveur système si `nameserver` est vide, épinglé sinon
    pub fn from_nameserver(nameserver: &str) -> Result<Self, ConfigError> {
        let nameserver = nameserver.trim();
        if nameserver.is_empty() {
            return Ok(DnsResolver::System);
        }

        let addr = parse_nameserver(nameserver)?;
        let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let resolver = TokioAsyncResolver::tokio(config, resolver_opts());

        Ok(DnsResolver::Pinned { nameserver: addr, resolver })
    }

    pub fn describe(&self) -> String {
        match self {
            DnsResolver::System => "system resolver".to_string(),
            DnsResolver::Pinned { nameserver, .. } => format!("nameserver {}", nameserver),
        }
    }
}

/// A et AAAA comme le résolveur système, sans cache : chaque cycle de
/// rafraîchissement voit la réponse courante du serveur
fn resolver_opts() -> ResolverOpts {
    let mut opts = ResolverOpts::default();
    opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
    opts.cache_size = 0;
    opts
}

/// "1.1.1.1" devient "1.1.1.1:53", un port explicite est conservé
pub fn parse_nameserver(raw: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    raw.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| ConfigError::InvalidNameserver(raw.to_string()))
}

#[async_trait]
impl Resolve for DnsResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let found: Vec<IpAddr> = match self {
            DnsResolver::System => tokio::net::lookup_host((host, 0))
                .await
                .map_err(|e| lookup_error(host, e))?
                .map(|addr| addr.ip())
                .collect(),
            DnsResolver::Pinned { resolver, .. } => resolver
                .lookup_ip(host)
                .await
                .map_err(|e| lookup_error(host, e))?
                .iter()
                .collect(),
        };

        let addrs = dedup_preserving_order(found);
        if addrs.is_empty() {
            return Err(ResolveError::NoAddresses(host.to_string()));
        }
        Ok(addrs)
    }
}

fn lookup_error(host: &str, e: impl std::fmt::Display) -> ResolveError {
    ResolveError::Lookup {
        host: host.to_string(),
        message: e.to_string(),
    }
}

fn dedup_preserving_order(addrs: Vec<IpAddr>) -> Vec<IpAddr> {
    let mut out: Vec<IpAddr> = Vec::with_capacity(addrs.len());
    for addr in addrs {
        if !out.contains(&addr) {
            out.push(addr);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nameserver_appends_dns_port() {
        assert_eq!(parse_nameserver("1.1.1.1").unwrap(), "1.1.1.1:53".parse().unwrap());
        assert_eq!(parse_nameserver("9.9.9.9:5353").unwrap(), "9.9.9.9:5353".parse().unwrap());
        assert_eq!(parse_nameserver("2001:db8::1").unwrap(), "[2001:db8::1]:53".parse().unwrap());
        assert!(matches!(
            parse_nameserver("dns.example"),
            Err(ConfigError::InvalidNameserver(_))
        ));
    }

    #[test]
    fn test_dedup_preserves_resolver_order() {
        let a: IpAddr = "10.0.0.2".parse().unwrap();
        let b: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(dedup_preserving_order(vec![a, b, a]), vec![a, b]);
    }

    #[tokio::test]
    async fn test_ip_literal_skips_lookup() {
        let resolver = DnsResolver::System;
        let addrs = resolver.lookup("192.0.2.7").await.unwrap();
        assert_eq!(addrs, vec!["192.0.2.7".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_pinned_resolver_asks_both_families_uncached() {
        let opts = resolver_opts();
        assert_eq!(opts.ip_strategy, LookupIpStrategy::Ipv4AndIpv6);
        assert_eq!(opts.cache_size, 0);
    }

    #[tokio::test]
    async fn test_pinned_resolver_is_built() {
        let resolver = DnsResolver::from_nameserver("127.0.0.1").unwrap();
        assert_eq!(resolver.describe(), "nameserver 127.0.0.1:53");
        assert_eq!(DnsResolver::from_nameserver("  ").unwrap().describe(), "system resolver");
    }
}
