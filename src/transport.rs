//! Single-shot query transports over UDP and TCP.

use std::net::{IpAddr, SocketAddr};

use tokio::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::net;
use crate::query::Query;
use crate::wire::{Message, ParseOptions};

#[derive(Debug, Clone)]
pub struct UdpOptions {
    pub timeout: Option<Duration>,
    pub port: u16,
    pub source: Option<IpAddr>,
    pub source_port: u16,
    pub ignore_unexpected: bool,
    pub ignore_trailing: bool,
    pub raise_on_truncation: bool,
    pub ignore_errors: bool,
}

impl Default for UdpOptions {
    fn default() -> Self {
        UdpOptions {
            timeout: None,
            port: 53,
            source: None,
            source_port: 0,
            ignore_unexpected: false,
            ignore_trailing: false,
            raise_on_truncation: false,
            ignore_errors: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TcpOptions {
    pub timeout: Option<Duration>,
    pub port: u16,
    pub source: Option<IpAddr>,
    pub source_port: u16,
    pub ignore_trailing: bool,
}

impl Default for TcpOptions {
    fn default() -> Self {
        TcpOptions {
            timeout: None,
            port: 53,
            source: None,
            source_port: 0,
            ignore_trailing: false,
        }
    }
}

/// Compute the destination and source addresses for a query.
///
/// A supplied source must agree with the destination's address family; a
/// bare `source_port` binds the wildcard address of that family.
pub(crate) fn destination_and_source(
    where_: IpAddr,
    port: u16,
    source: Option<IpAddr>,
    source_port: u16,
) -> Result<(SocketAddr, Option<SocketAddr>)> {
    let destination = SocketAddr::new(where_, port);
    let source = match source {
        Some(addr) => {
            if addr.is_ipv4() != where_.is_ipv4() {
                return Err(Error::InvalidArgument(
                    "different address families for source and destination".to_string(),
                ));
            }
            Some(SocketAddr::new(addr, source_port))
        }
        None if source_port != 0 => Some(net::wildcard_for(destination, source_port)),
        None => None,
    };
    Ok((destination, source))
}

/// Send a query via UDP and return the reply.
pub async fn udp(q: &Query, where_: IpAddr, options: UdpOptions) -> Result<Message> {
    let wire = q.to_wire();
    let (destination, source) =
        destination_and_source(where_, options.port, options.source, options.source_port)?;
    let (begin, expiration) = net::compute_times(options.timeout);
    let sock = net::make_udp_socket(destination, source).await?;
    net::send_udp(&sock, &wire, destination, expiration).await?;
    let receive_options = net::UdpReceiveOptions {
        ignore_unexpected: options.ignore_unexpected,
        ignore_trailing: options.ignore_trailing,
        raise_on_truncation: options.raise_on_truncation,
        ignore_errors: options.ignore_errors,
        query: Some(q),
    };
    let (mut reply, _) =
        net::receive_udp(&sock, Some(destination), expiration, &receive_options).await?;
    reply.time = Some(begin.elapsed());
    // receive_udp has already matched the reply when ignore_errors is set
    if !(options.ignore_errors || q.is_response(&reply)) {
        return Err(Error::BadResponse);
    }
    Ok(reply)
}

/// Try UDP first; retry over TCP when the reply came back truncated.
/// Returns the reply and whether TCP ended up being used.
pub async fn udp_with_fallback(
    q: &Query,
    where_: IpAddr,
    options: UdpOptions,
) -> Result<(Message, bool)> {
    let udp_options = UdpOptions {
        raise_on_truncation: true,
        ..options.clone()
    };
    match udp(q, where_, udp_options).await {
        Ok(reply) => Ok((reply, false)),
        Err(Error::Truncated { .. }) => {
            debug!("UDP reply from {} was truncated, retrying over TCP", where_);
            let tcp_options = TcpOptions {
                timeout: options.timeout,
                port: options.port,
                source: options.source,
                source_port: options.source_port,
                ignore_trailing: options.ignore_trailing,
            };
            let reply = tcp(q, where_, tcp_options).await?;
            Ok((reply, true))
        }
        Err(error) => Err(error),
    }
}

/// Send a query via TCP and return the reply.
pub async fn tcp(q: &Query, where_: IpAddr, options: TcpOptions) -> Result<Message> {
    let wire = q.to_wire();
    let (destination, source) =
        destination_and_source(where_, options.port, options.source, options.source_port)?;
    let (begin, expiration) = net::compute_times(options.timeout);
    let mut stream = net::connect_tcp(destination, source, expiration).await?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_mismatch_rejected() {
        let err = destination_and_source(
            "192.0.2.1".parse().unwrap(),
            53,
            Some("2001:db8::1".parse().unwrap()),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_source_port_binds_wildcard() {
        let (_, source) =
            destination_and_source("2001:db8::1".parse().unwrap(), 53, None, 5300).unwrap();
        assert_eq!(source, Some("[::]:5300".parse().unwrap()));
    }
}
