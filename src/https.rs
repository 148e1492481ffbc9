//! DNS over HTTPS (RFC 8484) for HTTP/1.1 and HTTP/2, with an HTTP/3 path
//! over QUIC behind the `doh3` feature.

use std::net::IpAddr;

use tokio::time::Duration;

use crate::error::{Error, Result};
use crate::query::Query;
use crate::tls::Verify;
use crate::wire::Message;

/// Which HTTP version to use.  `Default` picks the first available of
/// HTTP/2, HTTP/1.1, and HTTP/3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpVersion {
    #[default]
    Default,
    H1,
    H2,
    H3,
}

#[derive(Debug, Clone)]
pub struct HttpsOptions {
    pub timeout: Option<Duration>,
    pub port: u16,
    pub source: Option<IpAddr>,
    pub source_port: u16,
    pub ignore_trailing: bool,
    /// Path used when the destination is an IP address rather than a URL.
    pub path: String,
    /// POST the wire form; otherwise GET with `?dns=<base64url>`.
    pub post: bool,
    /// Connect to this address while keeping the URL hostname for TLS.
    pub bootstrap_address: Option<IpAddr>,
    pub verify: Verify,
    pub http_version: HttpVersion,
}

impl Default for HttpsOptions {
    fn default() -> Self {
        HttpsOptions {
            timeout: None,
            port: 443,
            source: None,
            source_port: 0,
            ignore_trailing: false,
            path: "/dns-query".to_string(),
            post: true,
            bootstrap_address: None,
            verify: Verify::Default,
            http_version: HttpVersion::Default,
        }
    }
}

/// Send a query via DNS-over-HTTPS and return the reply.
///
/// `where_` is either a nameserver IP address (the URL is then
/// `https://<address>:<port><path>`) or a full URL.
#[cfg(not(any(feature = "doh", feature = "doh3")))]
pub async fn https(_q: &Query, _where: &str, _options: HttpsOptions) -> Result<Message> {
    Err(Error::NoDoh("DNS-over-HTTPS is not available."))
}

/// Send a query via DNS-over-HTTPS and return the reply.
///
/// `where_` is either a nameserver IP address (the URL is then
/// `https://<address>:<port><path>`) or a full URL.
#[cfg(any(feature = "doh", feature = "doh3"))]
pub async fn https(q: &Query, where_: &str, options: HttpsOptions) -> Result<Message> {
    let target = UrlTarget::resolve(where_, &options)?;
    let want_h3 = matches!(options.http_version, HttpVersion::H3)
        || (matches!(options.http_version, HttpVersion::Default) && cfg!(not(feature = "doh")));
    if want_h3 {
        #[cfg(feature = "doh3")]
        return h3_query(q, &target, &options).await;
        #[cfg(not(feature = "doh3"))]
        return Err(Error::NoDoh("DNS-over-HTTP3 is not available."));
    }
    #[cfg(feature = "doh")]
    return doh_query(q, &target, &options).await;
    #[cfg(not(feature = "doh"))]
    Err(Error::NoDoh("DNS-over-HTTPS is not available."))
}

#[cfg(any(feature = "doh", feature = "doh3"))]
struct UrlTarget {
    url: String,
    /// `None` when the URL host is a literal address.
    domain: Option<String>,
    port: u16,
    bootstrap: Option<IpAddr>,
}

#[cfg(any(feature = "doh", feature = "doh3"))]
impl UrlTarget {
    fn resolve(where_: &str, options: &HttpsOptions) -> Result<UrlTarget> {
        let url = if let Ok(ip) = where_.parse::<IpAddr>() {
            match ip {
                IpAddr::V4(_) => format!("https://{}:{}{}", ip, options.port, options.path),
                IpAddr::V6(_) => format!("https://[{}]:{}{}", ip, options.port, options.path),
            }
        } else {
            where_.to_string()
        };
        let parsed = url::Url::parse(&url)
            .map_err(|e| Error::InvalidArgument(format!("invalid URL {}: {}", url, e)))?;
        let port = parsed.port().unwrap_or(options.port);
        let mut bootstrap = options.bootstrap_address;
        let domain = match parsed.host() {
            Some(url::Host::Domain(domain)) => Some(domain.to_string()),
            Some(url::Host::Ipv4(addr)) => {
                bootstrap = bootstrap.or(Some(IpAddr::V4(addr)));
                None
            }
            Some(url::Host::Ipv6(addr)) => {
                bootstrap = bootstrap.or(Some(IpAddr::V6(addr)));
                None
            }
            None => {
                return Err(Error::InvalidArgument("no hostname in URL".to_string()));
            }
        };
        Ok(UrlTarget {
            url,
            domain,
            port,
            bootstrap,
        })
    }
}

#[cfg(any(feature = "doh", feature = "doh3"))]
fn finish_reply(
    q: &Query,
    wire: Vec<u8>,
    begin: tokio::time::Instant,
    options: &HttpsOptions,
) -> Result<Message> {
    let parse_options = crate::wire::ParseOptions {
        ignore_trailing: options.ignore_trailing,
        ..Default::default()
    };
    let mut reply = crate::wire::parse_message(wire, &parse_options)?;
    reply.time = Some(begin.elapsed());
    if !q.is_response(&reply) {
        return Err(Error::BadResponse);
    }
    Ok(reply)
}

#[cfg(feature = "doh")]
async fn doh_query(q: &Query, target: &UrlTarget, options: &HttpsOptions) -> Result<Message> {
    use base64::Engine as _;

    if options.source_port != 0 {
        return Err(Error::InvalidArgument(
            "source_port is not supported for DNS-over-HTTPS".to_string(),
        ));
    }
    // HTTP/2 zeroes the message id the same way the QUIC transports do;
    // only an explicit HTTP/1.1 request keeps the caller's id.
    let mut q = q.clone();
    if !matches!(options.http_version, HttpVersion::H1) {
        q.set_id(0);
    }
    let wire = q.to_wire();
    let (begin, _expiration) = crate::net::compute_times(options.timeout);

    let mut builder = reqwest::Client::builder().use_rustls_tls();
    builder = match options.http_version {
        HttpVersion::H1 => builder.http1_only(),
        HttpVersion::H2 => builder.http2_prior_knowledge(),
        _ => builder,
    };
    match &options.verify {
        Verify::Default => {}
        Verify::Insecure => builder = builder.danger_accept_invalid_certs(true),
        Verify::Path(path) => {
            for cert in load_certificates(path)? {
                builder = builder.add_root_certificate(cert);
            }
        }
    }
    if let Some(source) = options.source {
        builder = builder.local_address(source);
    }
    if let (Some(domain), Some(bootstrap)) = (&target.domain, target.bootstrap) {
        builder = builder.resolve(domain, std::net::SocketAddr::new(bootstrap, target.port));
    }
    let client = builder.build()?;

    let request = if options.post {
        client
            .post(&target.url)
            .header("accept", "application/dns-message")
            .header("content-type", "application/dns-message")
            .body(wire)
    } else {
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&wire);
        client
            .get(&target.url)
            .header("accept", "application/dns-message")
            .query(&[("dns", encoded)])
    };
    let request = match options.timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    };
    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.bytes().await?;
    if !(200..=299).contains(&status) {
        return Err(Error::HttpStatus {
            peer: target.url.clone(),
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    finish_reply(&q, body.to_vec(), begin, options)
}

#[cfg(feature = "doh")]
fn load_certificates(path: &std::path::Path) -> Result<Vec<reqwest::Certificate>> {
    let mut files = Vec::new();
    if path.is_file() {
        files.push(path.to_path_buf());
    } else if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry_path = entry?.path();
            if entry_path.is_file() {
                files.push(entry_path);
            }
        }
    } else {
        return Err(Error::InvalidArgument("invalid verify string".to_string()));
    }
    let mut certificates = Vec::new();
    for file in files {
        let pem = std::fs::File::open(&file)?;
        let mut reader = std::io::BufReader::new(pem);
        for cert in rustls_pemfile::certs(&mut reader) {
            certificates.push(reqwest::Certificate::from_der(&cert?)?);
        }
    }
    Ok(certificates)
}

/// HTTP/3: one request over a QUIC connection, with the message id forced
/// to 0 and the `:status` pseudo-header deciding success.
#[cfg(feature = "doh3")]
async fn h3_query(q: &Query, target: &UrlTarget, options: &HttpsOptions) -> Result<Message> {
    use base64::Engine as _;
    use bytes::Buf;

    let mut q = q.clone();
    q.set_id(0);
    let wire = q.to_wire();
    let (begin, expiration) = crate::net::compute_times(options.timeout);

    let target_ip = match (target.bootstrap, &target.domain) {
        (Some(ip), _) => ip,
        (None, Some(domain)) => {
            let mut addrs = crate::net::deadline(
                expiration,
                tokio::net::lookup_host((domain.as_str(), target.port)),
            )
            .await??;
            addrs
                .next()
                .ok_or_else(|| Error::InvalidArgument(format!("could not resolve {}", domain)))?
                .ip()
        }
        (None, None) => unreachable!("UrlTarget always has a domain or a bootstrap address"),
    };
    let (destination, source) = crate::transport::destination_and_source(
        target_ip,
        target.port,
        options.source,
        options.source_port,
    )?;

    let (endpoint, connection) = crate::quic::connect_endpoint(
        destination,
        source,
        &options.verify,
        target.domain.as_deref(),
        &[b"h3"],
        expiration,
    )
    .await?;

    let h3_conn = h3_quinn::Connection::new(connection.clone());
    let (mut driver, mut send_request) = h3::client::new(h3_conn).await.map_err(h3_err)?;
    let drive = tokio::spawn(async move {
        let _ = std::future::poll_fn(|cx| driver.poll_close(cx)).await;
    });

    let uri: http::Uri = if options.post {
        target.url.parse()
    } else {
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&wire);
        format!("{}?dns={}", target.url, encoded).parse()
    }
    .map_err(|e| Error::InvalidArgument(format!("invalid URL {}: {}", target.url, e)))?;

    let mut request = http::Request::builder()
        .method(if options.post { "POST" } else { "GET" })
        .uri(uri)
        .header("accept", "application/dns-message");
    if options.post {
        request = request.header("content-type", "application/dns-message");
    }
    let request = request
        .body(())
        .map_err(|e| Error::InvalidArgument(e.to_string()))?;

    let mut stream = crate::net::deadline(expiration, send_request.send_request(request))
        .await?
        .map_err(h3_err)?;
    if options.post {
        crate::net::deadline(expiration, stream.send_data(bytes::Bytes::from(wire)))
            .await?
            .map_err(h3_err)?;
    }
    crate::net::deadline(expiration, stream.finish())
        .await?
        .map_err(h3_err)?;

    let response = crate::net::deadline(expiration, stream.recv_response())
        .await?
        .map_err(h3_err)?;
    let status = response.status().as_u16();
    let mut body = Vec::new();
    while let Some(mut chunk) = crate::net::deadline(expiration, stream.recv_data())
        .await?
        .map_err(h3_err)?
    {
        while chunk.has_remaining() {
            let piece = chunk.chunk();
            body.extend_from_slice(piece);
            let advanced = piece.len();
            chunk.advance(advanced);
        }
    }

    connection.close(0u32.into(), b"");
    drop(endpoint);
    drive.abort();

    if !(200..=299).contains(&status) {
        return Err(Error::HttpStatus {
            peer: target.url.clone(),
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    finish_reply(&q, body, begin, options)
}

#[cfg(feature = "doh3")]
fn h3_err(error: impl std::fmt::Display) -> Error {
    Error::Quic(error.to_string())
}

#[cfg(all(test, feature = "doh"))]
mod tests {
    use super::*;

    #[test]
    fn test_url_from_ip() {
        let options = HttpsOptions::default();
        let target = UrlTarget::resolve("192.0.2.1", &options).unwrap();
        assert_eq!(target.url, "https://192.0.2.1:443/dns-query");
        assert_eq!(target.domain, None);
        assert_eq!(target.bootstrap, Some("192.0.2.1".parse().unwrap()));

        let target = UrlTarget::resolve("2001:db8::1", &options).unwrap();
        assert_eq!(target.url, "https://[2001:db8::1]:443/dns-query");
    }

    #[test]
    fn test_url_passthrough() {
        let options = HttpsOptions::default();
        let target = UrlTarget::resolve("https://dns.example/custom", &options).unwrap();
        assert_eq!(target.url, "https://dns.example/custom");
        assert_eq!(target.domain.as_deref(), Some("dns.example"));
        assert_eq!(target.port, 443);
        assert_eq!(target.bootstrap, None);

        let target = UrlTarget::resolve("https://dns.example:8443/q", &options).unwrap();
        assert_eq!(target.port, 8443);
    }
}
