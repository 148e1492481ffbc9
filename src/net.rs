//! Deadline-driven socket I/O and DNS-over-TCP framing.
//!
//! Every blocking operation takes an absolute `expiration` instant (or
//! `None` for no limit).  The remaining wait is re-derived from that same
//! instant at every suspension point, so retries cannot stretch the total
//! budget.

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream, UdpSocket};
use tokio::time::{timeout_at, Duration, Instant};

use crate::error::{Error, Result};
use crate::query::Query;
use crate::wire::{self, Message, ParseOptions};

pub const MAX_UDP_SIZE: usize = 65535;

/// `(begin, expiration)` for a relative timeout.
pub fn compute_times(timeout: Option<Duration>) -> (Instant, Option<Instant>) {
    let now = Instant::now();
    (now, timeout.map(|t| now + t))
}

/// Run `future` under the absolute deadline; an expired deadline fails
/// `Timeout` without polling the future to completion.
pub async fn deadline<F>(expiration: Option<Instant>, future: F) -> Result<F::Output>
where
    F: Future,
{
    match expiration {
        Some(at) => timeout_at(at, future).await.map_err(|_| Error::Timeout),
        None => Ok(future.await),
    }
}

/// Does a datagram from `from` answer a query sent to `destination`?
///
/// Multicast destinations are matched on port only.  A mismatch either
/// fails `UnexpectedSource` or, with `ignore_unexpected`, reports the
/// datagram as skippable.
pub fn matches_destination(
    from: SocketAddr,
    destination: Option<SocketAddr>,
    ignore_unexpected: bool,
) -> Result<bool> {
    let destination = match destination {
        Some(d) => d,
        None => return Ok(true),
    };
    if from == destination
        || (destination.ip().is_multicast() && from.port() == destination.port())
    {
        return Ok(true);
    }
    if ignore_unexpected {
        return Ok(false);
    }
    Err(Error::UnexpectedSource {
        from,
        expected: destination,
    })
}

/// Send one datagram.
pub async fn send_udp(
    sock: &UdpSocket,
    wire: &[u8],
    destination: SocketAddr,
    expiration: Option<Instant>,
) -> Result<usize> {
    Ok(deadline(expiration, sock.send_to(wire, destination)).await??)
}

/// Options for [`receive_udp`].
#[derive(Default)]
pub struct UdpReceiveOptions<'a> {
    pub ignore_unexpected: bool,
    pub ignore_trailing: bool,
    pub raise_on_truncation: bool,
    /// Keep listening through malformed datagrams and replies that do not
    /// answer `query`, until a valid response or the deadline.
    pub ignore_errors: bool,
    pub query: Option<&'a Query>,
}

/// Receive datagrams until one parses as an acceptable reply.
///
/// Datagrams from the wrong source are rejected or skipped per
/// [`matches_destination`]; with `ignore_errors` set, malformed datagrams
/// and replies that do not answer `query` are skipped as well.
pub async fn receive_udp(
    sock: &UdpSocket,
    destination: Option<SocketAddr>,
    expiration: Option<Instant>,
    options: &UdpReceiveOptions<'_>,
) -> Result<(Message, SocketAddr)> {
    let mut buf = vec![0u8; MAX_UDP_SIZE];
    loop {
        let (len, from) = deadline(expiration, sock.recv_from(&mut buf)).await??;
        if !matches_destination(from, destination, options.ignore_unexpected)? {
            continue;
        }
        let parse_options = ParseOptions {
            ignore_trailing: options.ignore_trailing,
            raise_on_truncation: options.raise_on_truncation,
        };
        let message = match wire::parse_message(buf[..len].to_vec(), &parse_options) {
            Ok(message) => message,
            Err(Error::Truncated { message }) => {
                // A truncated reply still carries the header, so we can
                // tell whether it answers our query before bailing out.
                if options.ignore_errors
                    && options.query.map_or(false, |q| !q.is_response(&message))
                {
                    continue;
                }
                return Err(Error::Truncated { message });
            }
            Err(error) => {
                if options.ignore_errors {
                    continue;
                }
                return Err(error);
            }
        };
        if options.ignore_errors {
            if let Some(query) = options.query {
                if !query.is_response(&message) {
                    continue;
                }
            }
        }
        return Ok((message, from));
    }
}

async fn read_exact_with_deadline<S>(
    stream: &mut S,
    buf: &mut [u8],
    expiration: Option<Instant>,
) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    deadline(expiration, stream.read_exact(buf)).await??;
    Ok(())
}

async fn write_all_with_deadline<S>(
    stream: &mut S,
    data: &[u8],
    expiration: Option<Instant>,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    deadline(expiration, stream.write_all(data)).await??;
    Ok(())
}

/// Prepend the 16-bit length and write the whole frame in one buffer, so a
/// short first write never pushes a bare length prefix onto the network.
pub async fn send_tcp<S>(stream: &mut S, wire: &[u8], expiration: Option<Instant>) -> Result<usize>
where
    S: AsyncWrite + Unpin,
{
    if wire.len() > MAX_UDP_SIZE {
        return Err(Error::InvalidArgument(
            "message too long for length-prefixed framing".to_string(),
        ));
    }
    let mut frame = Vec::with_capacity(wire.len() + 2);
    frame.extend_from_slice(&(wire.len() as u16).to_be_bytes());
    frame.extend_from_slice(wire);
    write_all_with_deadline(stream, &frame, expiration).await?;
    Ok(frame.len())
}

/// Read one length-prefixed frame.
pub async fn read_tcp_frame<S>(stream: &mut S, expiration: Option<Instant>) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    read_exact_with_deadline(stream, &mut len_buf, expiration).await?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut wire = vec![0u8; len];
    read_exact_with_deadline(stream, &mut wire, expiration).await?;
    Ok(wire)
}

/// Read and parse one length-prefixed message.
pub async fn receive_tcp<S>(
    stream: &mut S,
    expiration: Option<Instant>,
    parse_options: &ParseOptions,
) -> Result<Message>
where
    S: AsyncRead + Unpin,
{
    let wire = read_tcp_frame(stream, expiration).await?;
    wire::parse_message(wire, parse_options)
}

/// Connect a stream socket, optionally bound to a source address, under
/// the deadline.
pub async fn connect_tcp(
    destination: SocketAddr,
    source: Option<SocketAddr>,
    expiration: Option<Instant>,
) -> Result<TcpStream> {
    let socket = if destination.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    if let Some(source) = source {
        socket.bind(source)?;
    }
    Ok(deadline(expiration, socket.connect(destination)).await??)
}

/// Bind a datagram socket for `destination`, on `source` if given and on
/// the wildcard address of the destination's family otherwise.
pub async fn make_udp_socket(
    destination: SocketAddr,
    source: Option<SocketAddr>,
) -> Result<UdpSocket> {
    let bind_addr = source.unwrap_or_else(|| wildcard_for(destination, 0));
    Ok(UdpSocket::bind(bind_addr).await?)
}

pub fn wildcard_for(destination: SocketAddr, port: u16) -> SocketAddr {
    if destination.is_ipv4() {
        SocketAddr::new("0.0.0.0".parse().unwrap(), port)
    } else {
        SocketAddr::new("::".parse().unwrap(), port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_destination() {
        let dest: SocketAddr = "192.0.2.1:53".parse().unwrap();
        let other: SocketAddr = "192.0.2.2:53".parse().unwrap();
        assert!(matches_destination(dest, Some(dest), false).unwrap());
        assert!(matches_destination(other, None, false).unwrap());
        assert!(!matches_destination(other, Some(dest), true).unwrap());
        assert!(matches!(
            matches_destination(other, Some(dest), false),
            Err(Error::UnexpectedSource { .. })
        ));
        // multicast destinations match on port alone
        let mcast: SocketAddr = "224.0.0.251:5353".parse().unwrap();
        let peer: SocketAddr = "192.0.2.7:5353".parse().unwrap();
        assert!(matches_destination(peer, Some(mcast), false).unwrap());
        let wrong_port: SocketAddr = "192.0.2.7:53".parse().unwrap();
        assert!(matches!(
            matches_destination(wrong_port, Some(mcast), false),
            Err(Error::UnexpectedSource { .. })
        ));
    }

    #[tokio::test]
    async fn test_deadline_expired() {
        let (_, expiration) = compute_times(Some(Duration::from_millis(0)));
        let err = deadline(expiration, std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_tcp_framing_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let wire = vec![0xab; 40];
        send_tcp(&mut a, &wire, None).await.unwrap();
        let frame = read_tcp_frame(&mut b, None).await.unwrap();
        assert_eq!(frame, wire);
    }
}
