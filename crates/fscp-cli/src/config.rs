//! Daemon configuration file.
//!
//! TOML, loaded once at startup and translated into the engine
//! configuration plus the identity and trust material read from disk.

use anyhow::{bail, Context, Result};
use fscp_core::{Endpoint, EngineConfig, ForwardingMode, IpNetwork, ResolutionProtocol};
use fscp_crypto::x509::private_key_from_pem;
use fscp_crypto::{Certificate, CipherSuite, EllipticCurve, Fingerprint, IdentityStore, TrustStore};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level daemon configuration
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Address the UDP socket binds to
    pub listen_on: Option<SocketAddr>,
    /// `ipv4` or `ipv6` name resolution
    pub hostname_resolution_protocol: Option<String>,
    /// `switch` or `router`
    pub mode: Option<String>,
    /// PID file path (daemonizing platforms)
    pub pid_file: Option<PathBuf>,
    /// Certificates and keys
    #[serde(default)]
    pub security: SecurityConfig,
    /// Protocol tuning
    #[serde(default)]
    pub fscp: FscpConfig,
    /// Switch-mode policies
    #[serde(default)]
    pub switch: SwitchConfig,
    /// Router-mode announcements
    #[serde(default)]
    pub router: RouterConfig,
}

/// Certificate and key material locations
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// PEM file with the signing certificate
    pub signature_certificate_file: Option<PathBuf>,
    /// PEM file with the signing private key
    pub signature_private_key_file: Option<PathBuf>,
    /// PEM file with a distinct encryption certificate
    pub encryption_certificate_file: Option<PathBuf>,
    /// PEM file with the encryption private key
    pub encryption_private_key_file: Option<PathBuf>,
    /// PEM files declared trusted a priori
    #[serde(default)]
    pub trust_anchor_files: Vec<PathBuf>,
}

/// Protocol tuning knobs
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FscpConfig {
    /// Hello exchange budget in milliseconds
    pub hello_timeout_ms: Option<u64>,
    /// Session idle timeout in milliseconds
    pub session_timeout_ms: Option<u64>,
    /// Keep-alive period in milliseconds
    pub keepalive_period_ms: Option<u64>,
    /// Offered cipher suites, preference first
    pub cipher_suite_capabilities: Option<Vec<String>>,
    /// Offered curves, preference first
    pub elliptic_curve_capabilities: Option<Vec<String>>,
    /// Accept changed peer certificates
    pub allow_peer_cert_rotation: Option<bool>,
    /// Answer contact requests
    pub contact_sharing_enabled: Option<bool>,
    /// `host:port` pairs greeted at startup; names are resolved using the
    /// configured resolution protocol
    #[serde(default)]
    pub contact_endpoints: Vec<String>,
    /// Hex SHA-256 fingerprints located via the contact exchange
    #[serde(default)]
    pub contact_fingerprints: Vec<String>,
}

/// Switch-mode policies
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SwitchConfig {
    /// Forward frames between two remote peers
    pub client_routing_enabled: Option<bool>,
    /// Accept relayed source MACs and disable learning
    pub relay_mode_enabled: Option<bool>,
}

/// Router-mode announcements
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Prefixes served by the local TAP
    #[serde(default)]
    pub local_routes: Vec<String>,
}

impl DaemonConfig {
    /// Parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("cannot parse configuration {}", path.display()))
    }

    /// Translate into the engine configuration.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::default();

        if let Some(listen_on) = self.listen_on {
            config.listen_on = listen_on;
        }

        if let Some(proto) = &self.hostname_resolution_protocol {
            config.hostname_resolution_protocol = match proto.as_str() {
                "ipv4" => ResolutionProtocol::Ipv4,
                "ipv6" => ResolutionProtocol::Ipv6,
                other => bail!("unknown hostname resolution protocol {other:?}"),
            };
        }

        if let Some(mode) = &self.mode {
            config.forwarding_mode = match mode.as_str() {
                "switch" => ForwardingMode::Switch,
                "router" => ForwardingMode::Router,
                other => bail!("unknown mode {other:?} (expected \"switch\" or \"router\")"),
            };
        }

        if let Some(ms) = self.fscp.hello_timeout_ms {
            config.hello_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.fscp.session_timeout_ms {
            config.session_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.fscp.keepalive_period_ms {
            config.keepalive_period = Duration::from_millis(ms);
        }

        if let Some(suites) = &self.fscp.cipher_suite_capabilities {
            config.cipher_suite_capabilities = suites
                .iter()
                .map(|s| {
                    s.parse::<CipherSuite>()
                        .map_err(|_| anyhow::anyhow!("unknown cipher suite {s:?}"))
                })
                .collect::<Result<_>>()?;
            if config.cipher_suite_capabilities.is_empty() {
                bail!("cipher_suite_capabilities must not be empty");
            }
        }

        if let Some(curves) = &self.fscp.elliptic_curve_capabilities {
            config.elliptic_curve_capabilities = curves
                .iter()
                .map(|s| {
                    s.parse::<EllipticCurve>()
                        .map_err(|_| anyhow::anyhow!("unknown elliptic curve {s:?}"))
                })
                .collect::<Result<_>>()?;
        }

        if let Some(allow) = self.fscp.allow_peer_cert_rotation {
            config.allow_peer_cert_rotation = allow;
        }
        if let Some(sharing) = self.fscp.contact_sharing_enabled {
            config.contact_sharing_enabled = sharing;
        }
        if let Some(client_routing) = self.switch.client_routing_enabled {
            config.client_routing_enabled = client_routing;
        }
        if let Some(relay) = self.switch.relay_mode_enabled {
            config.relay_mode_enabled = relay;
        }

        config.contact_fingerprints = self
            .fscp
            .contact_fingerprints
            .iter()
            .map(|s| parse_fingerprint(s))
            .collect::<Result<_>>()?;

        Ok(config)
    }

    /// Read and validate the identity material.
    pub fn identity(&self) -> Result<IdentityStore> {
        let cert_path = self
            .security
            .signature_certificate_file
            .as_ref()
            .context("security.signature_certificate_file is required")?;
        let key_path = self
            .security
            .signature_private_key_file
            .as_ref()
            .context("security.signature_private_key_file is required")?;

        let signing_cert = load_certificate(cert_path)?;
        let signing_key = load_private_key(key_path)?;

        let encryption = match (
            &self.security.encryption_certificate_file,
            &self.security.encryption_private_key_file,
        ) {
            (None, None) => None,
            (Some(cert), Some(key)) => {
                Some((load_certificate(cert)?, load_private_key(key)?))
            }
            _ => bail!(
                "encryption certificate and key must be configured together or not at all"
            ),
        };

        IdentityStore::new(signing_cert, signing_key, encryption)
            .context("invalid identity material")
    }

    /// Read the trust anchors.
    pub fn trust_store(&self) -> Result<TrustStore> {
        if self.security.trust_anchor_files.is_empty() {
            bail!("at least one trust anchor is required");
        }

        let mut store = TrustStore::new();
        for path in &self.security.trust_anchor_files {
            store.add_anchor(load_certificate(path)?);
        }
        Ok(store)
    }

    /// Resolve the configured contact endpoints with the configured address
    /// family.
    pub async fn resolved_contact_endpoints(
        &self,
        protocol: ResolutionProtocol,
    ) -> Result<Vec<Endpoint>> {
        let mut endpoints = Vec::with_capacity(self.fscp.contact_endpoints.len());

        for spec in &self.fscp.contact_endpoints {
            let mut addrs = tokio::net::lookup_host(spec.as_str())
                .await
                .with_context(|| format!("cannot resolve contact endpoint {spec:?}"))?;
            let wanted = addrs.find(|addr| match protocol {
                ResolutionProtocol::Ipv4 => addr.is_ipv4(),
                ResolutionProtocol::Ipv6 => addr.is_ipv6(),
            });
            match wanted {
                Some(addr) => endpoints.push(Endpoint::new(addr)),
                None => bail!("no {protocol:?} address for contact endpoint {spec:?}"),
            }
        }

        Ok(endpoints)
    }

    /// Parsed local route announcements (router mode).
    pub fn local_routes(&self) -> Result<Vec<IpNetwork>> {
        self.router
            .local_routes
            .iter()
            .map(|s| {
                s.parse::<IpNetwork>()
                    .map_err(|e| anyhow::anyhow!("bad route {s:?}: {e}"))
            })
            .collect()
    }
}

fn load_certificate(path: &Path) -> Result<Certificate> {
    let pem = std::fs::read(path)
        .with_context(|| format!("cannot read certificate {}", path.display()))?;
    Certificate::from_pem(&pem)
        .with_context(|| format!("cannot parse certificate {}", path.display()))
}

fn load_private_key(path: &Path) -> Result<fscp_crypto::RsaPrivateKey> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read private key {}", path.display()))?;
    private_key_from_pem(&pem)
        .with_context(|| format!("cannot parse private key {}", path.display()))
}

fn parse_fingerprint(hex_str: &str) -> Result<Fingerprint> {
    let bytes = hex::decode(hex_str)
        .with_context(|| format!("fingerprint {hex_str:?} is not hex"))?;
    let fingerprint: Fingerprint = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("fingerprint {hex_str:?} is not 32 bytes"))?;
    Ok(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [security]
            signature_certificate_file = "/etc/fscp/cert.pem"
            signature_private_key_file = "/etc/fscp/key.pem"
            trust_anchor_files = ["/etc/fscp/ca.pem"]
            "#,
        )
        .unwrap();

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.listen_on.port(), 12000);
        assert_eq!(engine.forwarding_mode, ForwardingMode::Switch);
    }

    #[test]
    fn test_full_config() {
        let config: DaemonConfig = toml::from_str(
            r#"
            listen_on = "0.0.0.0:13000"
            hostname_resolution_protocol = "ipv6"
            mode = "router"
            pid_file = "/run/fscpd.pid"

            [security]
            signature_certificate_file = "cert.pem"
            signature_private_key_file = "key.pem"
            trust_anchor_files = ["ca.pem"]

            [fscp]
            hello_timeout_ms = 5000
            session_timeout_ms = 60000
            keepalive_period_ms = 7000
            cipher_suite_capabilities = ["ecdhe_rsa_aes256_gcm_sha384"]
            elliptic_curve_capabilities = ["secp521r1", "secp384r1"]
            allow_peer_cert_rotation = true
            contact_endpoints = ["192.0.2.7:12000"]
            contact_fingerprints = ["0000000000000000000000000000000000000000000000000000000000000042"]

            [switch]
            client_routing_enabled = false
            relay_mode_enabled = true

            [router]
            local_routes = ["10.9.0.0/24", "2001:db8::/64"]
            "#,
        )
        .unwrap();

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.listen_on.port(), 13000);
        assert_eq!(engine.forwarding_mode, ForwardingMode::Router);
        assert_eq!(engine.hello_timeout, Duration::from_secs(5));
        assert_eq!(
            engine.cipher_suite_capabilities,
            vec![CipherSuite::EcdheRsaAes256GcmSha384]
        );
        assert!(engine.allow_peer_cert_rotation);
        assert!(!engine.client_routing_enabled);
        assert!(engine.relay_mode_enabled);
        assert_eq!(engine.contact_fingerprints[0][31], 0x42);
        assert_eq!(config.local_routes().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_contact_endpoint_resolution() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [security]
            [fscp]
            contact_endpoints = ["192.0.2.7:12000"]
            "#,
        )
        .unwrap();

        let endpoints = config
            .resolved_contact_endpoints(ResolutionProtocol::Ipv4)
            .await
            .unwrap();
        assert_eq!(endpoints, vec!["192.0.2.7:12000".parse().unwrap()]);

        // The literal has no IPv6 form.
        assert!(config
            .resolved_contact_endpoints(ResolutionProtocol::Ipv6)
            .await
            .is_err());
    }

    #[test]
    fn test_bad_mode_rejected() {
        let config: DaemonConfig = toml::from_str(
            r#"
            mode = "hub"
            [security]
            "#,
        )
        .unwrap();
        assert!(config.engine_config().is_err());
    }

    #[test]
    fn test_bad_fingerprint_rejected() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [security]
            [fscp]
            contact_fingerprints = ["abcd"]
            "#,
        )
        .unwrap();
        assert!(config.engine_config().is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: Result<DaemonConfig, _> = toml::from_str(
            r#"
            listen_port = 12000
            [security]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_identity_files_reported() {
        let config: DaemonConfig = toml::from_str("[security]\n").unwrap();
        assert!(config.identity().is_err());
        assert!(config.trust_store().is_err());
    }
}
