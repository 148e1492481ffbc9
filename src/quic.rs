//! DNS over QUIC (RFC 9250).

use std::net::IpAddr;
use std::sync::Arc;

use tokio::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::net;
use crate::query::Query;
use crate::tls::{build_client_config, Verify};
use crate::transport::destination_and_source;
use crate::wire::{self, Message, ParseOptions};

#[derive(Debug, Clone)]
pub struct QuicOptions {
    pub timeout: Option<Duration>,
    pub port: u16,
    pub source: Option<IpAddr>,
    pub source_port: u16,
    pub ignore_trailing: bool,
    pub verify: Verify,
    pub server_hostname: Option<String>,
    /// Reuse an established connection instead of dialing a new one.
    pub connection: Option<quinn::Connection>,
}

impl Default for QuicOptions {
    fn default() -> Self {
        QuicOptions {
            timeout: None,
            port: 853,
            source: None,
            source_port: 0,
            ignore_trailing: false,
            verify: Verify::Default,
            server_hostname: None,
            connection: None,
        }
    }
}

fn quic_err(error: impl std::fmt::Display) -> Error {
    Error::Quic(error.to_string())
}

/// Open a client endpoint and connect it to `destination`.
pub(crate) async fn connect_endpoint(
    destination: std::net::SocketAddr,
    source: Option<std::net::SocketAddr>,
    verify: &Verify,
    server_hostname: Option<&str>,
    alpn: &[&[u8]],
    expiration: Option<tokio::time::Instant>,
) -> Result<(quinn::Endpoint, quinn::Connection)> {
    let bind_addr = source.unwrap_or_else(|| net::wildcard_for(destination, 0));
    let mut endpoint = quinn::Endpoint::client(bind_addr)?;
    let tls_config = build_client_config(verify, alpn)?;
    let quic_config = quinn::crypto::rustls::QuicClientConfig::try_from(tls_config)
        .map_err(quic_err)?;
    endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(quic_config)));
    let server_name = server_hostname
        .map(str::to_string)
        .unwrap_or_else(|| destination.ip().to_string());
    let connecting = endpoint
        .connect(destination, &server_name)
        .map_err(quic_err)?;
    let connection = net::deadline(expiration, connecting)
        .await?
        .map_err(quic_err)?;
    debug!("QUIC connection established to {}", destination);
    Ok((endpoint, connection))
}

/// Exchange one length-prefixed message on a fresh bidirectional stream,
/// closing our side after the send.
pub(crate) async fn stream_exchange(
    connection: &quinn::Connection,
    wire: &[u8],
    expiration: Option<tokio::time::Instant>,
) -> Result<Vec<u8>> {
    let (mut send, mut recv) = net::deadline(expiration, connection.open_bi())
        .await?
        .map_err(quic_err)?;
    let mut frame = Vec::with_capacity(wire.len() + 2);
    frame.extend_from_slice(&(wire.len() as u16).to_be_bytes());
    frame.extend_from_slice(wire);
    net::deadline(expiration, send.write_all(&frame))
        .await?
        .map_err(quic_err)?;
    send.finish().map_err(quic_err)?;
    let mut len_buf = [0u8; 2];
    net::deadline(expiration, recv.read_exact(&mut len_buf))
        .await?
        .map_err(quic_err)?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut reply = vec![0u8; len];
    net::deadline(expiration, recv.read_exact(&mut reply))
        .await?
        .map_err(quic_err)?;
    Ok(reply)
}

/// Send a query via DNS-over-QUIC and return the reply.
///
/// The message id is forced to 0, one bidirectional stream carries exactly
/// one query, and the client closes its send side after writing.
pub async fn quic(q: &Query, where_: IpAddr, options: QuicOptions) -> Result<Message> {
    let mut q = q.clone();
    q.set_id(0);
    let wire = q.to_wire();
    let (destination, source) =
        destination_and_source(where_, options.port, options.source, options.source_port)?;
    let (begin, expiration) = net::compute_times(options.timeout);

    let mut endpoint = None;
    let connection = match &options.connection {
        Some(connection) => connection.clone(),
        None => {
            let (ep, connection) = connect_endpoint(
                destination,
                source,
                &options.verify,
                options.server_hostname.as_deref(),
                &[b"doq"],
                expiration,
            )
            .await?;
            endpoint = Some(ep);
            connection
        }
    };

    let reply_wire = stream_exchange(&connection, &wire, expiration).await?;

    if endpoint.is_some() {
        connection.close(0u32.into(), b"");
    }

    let parse_options = ParseOptions {
        ignore_trailing: options.ignore_trailing,
        ..Default::default()
    };
    let mut reply = wire::parse_message(reply_wire, &parse_options)?;
    reply.time = Some(begin.elapsed());
    if !q.is_response(&reply) {
        return Err(Error::BadResponse);
    }
    Ok(reply)
}
