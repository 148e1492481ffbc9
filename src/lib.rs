//! wiredns - a wire-level DNS client.
//!
//! The [`wire`] module parses RFC 1035 messages while preserving the byte
//! range of every element and localizing parse errors instead of throwing
//! the whole message away.  On top of that sit single-shot query
//! transports ([`udp`], [`tcp`], [`tls`], [`quic`], [`https`]) with
//! absolute-deadline timeout accounting, and the inbound AXFR/IXFR
//! transfer engine in [`xfr`].

pub mod error;
pub mod https;
pub mod net;
pub mod node;
pub mod query;
#[cfg(feature = "doq")]
pub mod quic;
pub mod tls;
pub mod transport;
pub mod wire;
pub mod xfr;

pub use error::{Error, Result, WireError};
pub use https::{https, HttpVersion, HttpsOptions};
pub use node::{Node, Rdataset, Rrset};
pub use query::Query;
#[cfg(feature = "doq")]
pub use quic::{quic, QuicOptions};
pub use tls::{tls, TlsOptions, Verify};
pub use transport::{tcp, udp, udp_with_fallback, TcpOptions, UdpOptions};
pub use wire::{Message, Name};
pub use xfr::{inbound_xfr, xfr, TransactionManager, UdpMode, XfrOptions, XfrStream};
