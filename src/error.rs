use std::net::SocketAddr;

use crate::wire;

/// Errors raised while decoding wire-format data.
///
/// These are the errors that get embedded into a [`wire::Message`] when a
/// record fails to parse, so their `Display` output is also what shows up in
/// the annotated hex dump.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("DNS message is malformed.")]
    Malformed,
    #[error("A DNS compression pointer points forward instead of backward.")]
    PointerForward,
    #[error("The label type in DNS name wire format is unknown.")]
    BadLabelType,
    #[error("A DNS name is > 255 octets long.")]
    NameTooLong,
    #[error("A DNS label is > 63 octets long.")]
    LabelTooLong,
    #[error("A DNS label is empty.")]
    EmptyLabel,
    #[error("The DNS packet passed to from_wire() has extra junk at the end of it.")]
    TrailingJunk,
    #[error("missing TSIG")]
    MissingTsig,
}

/// The error surface of the query transports and the transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("the DNS operation timed out")]
    Timeout,

    #[error("got a response from {from} instead of {expected}")]
    UnexpectedSource { from: SocketAddr, expected: SocketAddr },

    #[error("a DNS query response does not respond to the question asked")]
    BadResponse,

    /// The reply parsed but had the TC bit set.  The partially useful
    /// message is carried along so callers can still match it to a query.
    #[error("the DNS response was truncated")]
    Truncated { message: Box<wire::Message> },

    /// Internal signal from an inbound-transfer handler demanding a TCP
    /// retry.  Only surfaces to callers when `UdpMode::Only` forbids it.
    #[error("the zone transfer requires TCP")]
    UseTcp,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("zone transfer failed: {0}")]
    Transfer(String),

    #[error("{0}")]
    NoDoh(&'static str),

    #[error("DNS-over-QUIC is not available.")]
    NoDoq,

    #[error("{peer} responded with status code {status}: {body}")]
    HttpStatus {
        peer: String,
        status: u16,
        body: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[cfg(feature = "doh")]
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "doq")]
    #[error("QUIC transport error: {0}")]
    Quic(String),
}

pub type Result<T> = std::result::Result<T, Error>;
