//! DNS over TLS, plus the rustls client-config assembly shared with the
//! QUIC-based transports.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::RootCertStore;
use tokio::time::Duration;
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};
use crate::net;
use crate::query::Query;
use crate::transport::destination_and_source;
use crate::wire::{Message, ParseOptions};

/// How to verify the server certificate: the default CA bundle, no
/// verification at all, or a CA file or directory.
#[derive(Debug, Clone, Default)]
pub enum Verify {
    #[default]
    Default,
    Insecure,
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub timeout: Option<Duration>,
    pub port: u16,
    pub source: Option<IpAddr>,
    pub source_port: u16,
    pub ignore_trailing: bool,
    /// Caller-supplied TLS configuration; when set, `verify` is ignored.
    pub ssl_context: Option<Arc<rustls::ClientConfig>>,
    /// Hostname presented for SNI and certificate checks.  Without one the
    /// connection certifies the destination IP address instead.
    pub server_hostname: Option<String>,
    pub verify: Verify,
}

impl Default for TlsOptions {
    fn default() -> Self {
        TlsOptions {
            timeout: None,
            port: 853,
            source: None,
            source_port: 0,
            ignore_trailing: false,
            ssl_context: None,
            server_hostname: None,
            verify: Verify::Default,
        }
    }
}

/// Send a query via DNS-over-TLS and return the reply.
pub async fn tls(q: &Query, where_: IpAddr, options: TlsOptions) -> Result<Message> {
    let wire = q.to_wire();
    let (destination, source) =
        destination_and_source(where_, options.port, options.source, options.source_port)?;
    let (begin, expiration) = net::compute_times(options.timeout);
    let config = match &options.ssl_context {
        Some(config) => config.clone(),
        None => Arc::new(build_client_config(&options.verify, &[b"dot"])?),
    };
    let server_name = server_name(options.server_hostname.as_deref(), where_)?;
    let tcp = net::connect_tcp(destination, source, expiration).await?;
    let connector = TlsConnector::from(config);
    let mut stream = net::deadline(expiration, connector.connect(server_name, tcp)).await??;
    net::send_tcp(&mut stream, &wire, expiration).await?;
    let parse_options = ParseOptions {
        ignore_trailing: options.ignore_trailing,
        ..Default::default()
    };
    let mut reply = net::receive_tcp(&mut stream, expiration, &parse_options).await?;
    reply.time = Some(begin.elapsed());
    if !q.is_response(&reply) {
        return Err(Error::BadResponse);
    }
    Ok(reply)
}

pub(crate) fn server_name(
    hostname: Option<&str>,
    where_: IpAddr,
) -> Result<ServerName<'static>> {
    match hostname {
        Some(hostname) => ServerName::try_from(hostname.to_string())
            .map_err(|_| Error::InvalidArgument(format!("invalid server hostname {hostname}"))),
        None => Ok(ServerName::IpAddress(where_.into())),
    }
}

/// Assemble a rustls client config for the given verification mode and
/// ALPN protocols.  rustls' defaults already floor the protocol version at
/// TLS 1.2.  The crypto provider is pinned so a second provider showing up
/// in the dependency graph cannot make the builder ambiguous.
pub(crate) fn build_client_config(
    verify: &Verify,
    alpn: &[&[u8]],
) -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?;
    let mut config = match verify {
        Verify::Default => {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        Verify::Path(path) => builder
            .with_root_certificates(root_store_from_path(path)?)
            .with_no_client_auth(),
        Verify::Insecure => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureVerifier::new()))
            .with_no_client_auth(),
    };
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    Ok(config)
}

/// Build a root store from a CA file, or from every file in a CA
/// directory.
fn root_store_from_path(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    if path.is_file() {
        add_certs_from_file(&mut roots, path)?;
    } else if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry_path = entry?.path();
            if entry_path.is_file() {
                add_certs_from_file(&mut roots, &entry_path)?;
            }
        }
    } else {
        return Err(Error::InvalidArgument("invalid verify string".to_string()));
    }
    Ok(roots)
}

fn add_certs_from_file(roots: &mut RootCertStore, path: &Path) -> Result<()> {
    let pem = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(pem);
    for cert in rustls_pemfile::certs(&mut reader) {
        roots.add(cert?)?;
    }
    Ok(())
}

/// Accept any server certificate.  Used only for `Verify::Insecure`.
#[derive(Debug)]
struct InsecureVerifier(rustls::crypto::CryptoProvider);

impl InsecureVerifier {
    fn new() -> InsecureVerifier {
        InsecureVerifier(rustls::crypto::ring::default_provider())
    }
}

impl ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_path_must_exist() {
        let err =
            root_store_from_path(Path::new("/nonexistent/ca-bundle-wiredns")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_alpn_is_applied() {
        let config = build_client_config(&Verify::Insecure, &[b"dot"]).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"dot".to_vec()]);
    }

    #[test]
    fn test_server_name_falls_back_to_ip() {
        let name = server_name(None, "192.0.2.1".parse().unwrap()).unwrap();
        assert!(matches!(name, ServerName::IpAddress(_)));
        let name = server_name(Some("dns.example"), "192.0.2.1".parse().unwrap()).unwrap();
        assert!(matches!(name, ServerName::DnsName(_)));
    }
}
