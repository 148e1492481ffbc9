//! Inbound AXFR/IXFR zone transfers.
//!
//! The engine drives the sockets, deadlines, and UDP→TCP fallback; applying
//! the transferred records is the caller's business through the
//! [`TransactionManager`] trait.

use std::net::{IpAddr, SocketAddr};

use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::error::{Error, Result, WireError};
use crate::net;
use crate::query::{Query, QueryRecord};
use crate::wire::{self, DnsClass, Message, Name, ParseOptions, Rcode, Rdata, RecordType};

/// How UDP may be used for an IXFR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UdpMode {
    /// Never use UDP; always use TCP.
    #[default]
    Never,
    /// Try UDP, falling back to TCP when the server demands it.
    TryFirst,
    /// Use UDP and surface [`Error::UseTcp`] if that does not succeed.
    Only,
}

/// The zone side of a transfer: supplies the origin and class for query
/// construction and consumes the received messages.
///
/// `process_message` returns `Ok(true)` when the transfer is complete,
/// `Ok(false)` to keep receiving, and `Err(Error::UseTcp)` (valid only
/// over UDP) to demand a TCP retry.
pub trait TransactionManager {
    fn origin(&self) -> &Name;
    fn rdclass(&self) -> DnsClass;
    /// Called once per connection attempt, before the first message.
    fn begin(&mut self, rdtype: RecordType, base_serial: u32, is_udp: bool) -> Result<()>;
    fn process_message(&mut self, message: &Message) -> Result<bool>;
    /// Called when the transfer completes (`commit`) or is abandoned.
    fn finish(&mut self, _commit: bool) {}
}

impl<T: TransactionManager + ?Sized> TransactionManager for &mut T {
    fn origin(&self) -> &Name {
        (**self).origin()
    }
    fn rdclass(&self) -> DnsClass {
        (**self).rdclass()
    }
    fn begin(&mut self, rdtype: RecordType, base_serial: u32, is_udp: bool) -> Result<()> {
        (**self).begin(rdtype, base_serial, is_udp)
    }
    fn process_message(&mut self, message: &Message) -> Result<bool> {
        (**self).process_message(message)
    }
    fn finish(&mut self, commit: bool) {
        (**self).finish(commit)
    }
}

#[derive(Debug, Clone)]
pub struct XfrOptions {
    pub port: u16,
    /// Per-message timeout.
    pub timeout: Option<Duration>,
    /// Overall transfer deadline.
    pub lifetime: Option<Duration>,
    pub source: Option<IpAddr>,
    pub source_port: u16,
    pub udp_mode: UdpMode,
    /// Transfer type used when no query is supplied.
    pub rdtype: RecordType,
    /// IXFR base serial used when no query is supplied.
    pub serial: u32,
}

impl Default for XfrOptions {
    fn default() -> Self {
        XfrOptions {
            port: 53,
            timeout: None,
            lifetime: None,
            source: None,
            source_port: 0,
            udp_mode: UdpMode::Never,
            rdtype: RecordType::AXFR,
            serial: 0,
        }
    }
}

/// Build a transfer query from the transaction manager's origin and class.
/// An IXFR query carries the base serial in an authority SOA.
pub fn make_query(
    txn: &dyn TransactionManager,
    rdtype: RecordType,
    serial: u32,
) -> Result<Query> {
    if !matches!(rdtype, RecordType::AXFR | RecordType::IXFR) {
        return Err(Error::InvalidArgument(
            "query is not an AXFR or IXFR".to_string(),
        ));
    }
    let origin = txn.origin().clone();
    let mut query = Query::new(origin.clone(), rdtype, txn.rdclass());
    if rdtype == RecordType::IXFR {
        query.add_authority(QueryRecord {
            name: origin,
            rdclass: DnsClass::IN,
            rdtype: RecordType::SOA,
            ttl: 0,
            rdata: Rdata::Soa {
                mname: Name::root(),
                rname: Name::root(),
                serial,
                refresh: 0,
                retry: 0,
                expire: 0,
                minimum: 0,
            },
        });
    }
    Ok(query)
}

/// The base serial of a caller-built transfer query; `None` for AXFR.
pub fn extract_serial_from_query(query: &Query) -> Result<Option<u32>> {
    let question = query
        .question()
        .first()
        .ok_or_else(|| Error::InvalidArgument("query has no question".to_string()))?;
    match question.rdtype {
        RecordType::AXFR => Ok(None),
        RecordType::IXFR => {
            for record in query.authority() {
                if let Rdata::Soa { serial, .. } = &record.rdata {
                    return Ok(Some(*serial));
                }
            }
            Err(Error::InvalidArgument(
                "IXFR query missing base SOA".to_string(),
            ))
        }
        _ => Err(Error::InvalidArgument(
            "query is not an AXFR or IXFR".to_string(),
        )),
    }
}

enum XfrSocket {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

/// A pull iterator over the messages of an inbound transfer.
///
/// Each received message is handed to the transaction manager and then
/// yielded to the caller; [`next_message`](XfrStream::next_message)
/// returns `None` once the transfer is complete.
pub struct XfrStream<'a> {
    txn: Box<dyn TransactionManager + Send + 'a>,
    query: Query,
    wire: Vec<u8>,
    destination: SocketAddr,
    source: Option<SocketAddr>,
    timeout: Option<Duration>,
    expiration: Option<Instant>,
    udp_mode: UdpMode,
    is_ixfr: bool,
    rdtype: RecordType,
    base_serial: u32,
    sock: Option<XfrSocket>,
    begun: bool,
    done: bool,
    tsig_ctx: Option<Vec<u8>>,
}

impl<'a> std::fmt::Debug for XfrStream<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XfrStream")
            .field("query", &self.query)
            .field("destination", &self.destination)
            .field("source", &self.source)
            .field("timeout", &self.timeout)
            .field("udp_mode", &self.udp_mode)
            .field("is_ixfr", &self.is_ixfr)
            .field("rdtype", &self.rdtype)
            .field("base_serial", &self.base_serial)
            .field("begun", &self.begun)
            .field("done", &self.done)
            .finish()
    }
}

impl<'a> XfrStream<'a> {
    pub async fn start(
        where_: IpAddr,
        txn: Box<dyn TransactionManager + Send + 'a>,
        query: Option<Query>,
        options: XfrOptions,
    ) -> Result<XfrStream<'a>> {
        let (query, base_serial) = match query {
            Some(query) => {
                let serial = extract_serial_from_query(&query)?;
                (query, serial.unwrap_or(0))
            }
            None => (
                make_query(txn.as_ref(), options.rdtype, options.serial)?,
                options.serial,
            ),
        };
        let rdtype = query
            .question()
            .first()
            .ok_or_else(|| Error::InvalidArgument("query has no question".to_string()))?
            .rdtype;
        let is_ixfr = rdtype == RecordType::IXFR;
        let wire = query.to_wire();
        let (destination, source) = crate::transport::destination_and_source(
            where_,
            options.port,
            options.source,
            options.source_port,
        )?;
        let (_, expiration) = net::compute_times(options.lifetime);
        Ok(XfrStream {
            txn,
            query,
            wire,
            destination,
            source,
            timeout: options.timeout,
            expiration,
            udp_mode: options.udp_mode,
            is_ixfr,
            rdtype,
            base_serial,
            sock: None,
            begun: false,
            done: false,
            tsig_ctx: None,
        })
    }

    /// The MAC of the most recent TSIG-bearing response, threaded along for
    /// external validation of multi-message transfers.
    pub fn tsig_context(&self) -> Option<&[u8]> {
        self.tsig_ctx.as_deref()
    }

    fn is_udp(&self) -> bool {
        matches!(self.sock, Some(XfrSocket::Udp(_)))
    }

    async fn connect_and_send(&mut self) -> Result<()> {
        let use_udp = self.is_ixfr && self.udp_mode != UdpMode::Never;
        if use_udp {
            let sock = net::make_udp_socket(self.destination, self.source).await?;
            sock.connect(self.destination).await?;
            net::deadline(self.expiration, sock.send(&self.wire)).await??;
            self.sock = Some(XfrSocket::Udp(sock));
        } else {
            let mut stream =
                net::connect_tcp(self.destination, self.source, self.expiration).await?;
            net::send_tcp(&mut stream, &self.wire, self.expiration).await?;
            self.sock = Some(XfrSocket::Tcp(stream));
        }
        self.txn.begin(self.rdtype, self.base_serial, use_udp)?;
        self.begun = true;
        Ok(())
    }

    /// Receive, process, and yield the next transfer message.
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if self.sock.is_none() {
                self.connect_and_send().await?;
            }
            // Per-message deadline, capped by the overall lifetime.
            let (_, message_expiration) = net::compute_times(self.timeout);
            let expiration = match (message_expiration, self.expiration) {
                (Some(m), Some(l)) => Some(m.min(l)),
                (Some(m), None) => Some(m),
                (None, lifetime) => lifetime,
            };
            let reply_wire = match self.sock.as_mut().expect("socket was just connected") {
                XfrSocket::Udp(sock) => {
                    let mut buf = vec![0u8; net::MAX_UDP_SIZE];
                    let len = net::deadline(expiration, sock.recv(&mut buf)).await??;
                    buf.truncate(len);
                    buf
                }
                XfrSocket::Tcp(stream) => net::read_tcp_frame(stream, expiration).await?,
            };
            let message = match wire::parse_message(reply_wire, &ParseOptions::default()) {
                Ok(message) => message,
                Err(error) => {
                    self.abort();
                    return Err(error);
                }
            };
            if let Some(mac) = message.tsig_mac() {
                self.tsig_ctx = Some(mac);
            }
            match self.txn.process_message(&message) {
                Ok(done) => {
                    if done {
                        if self.query.is_signed() && !message.had_tsig() {
                            self.abort();
                            return Err(Error::Wire(WireError::MissingTsig));
                        }
                        self.done = true;
                        self.begun = false;
                        self.txn.finish(true);
                    }
                    return Ok(Some(message));
                }
                Err(Error::UseTcp) => {
                    debug_assert!(self.is_udp());
                    if self.udp_mode == UdpMode::Only {
                        self.abort();
                        return Err(Error::UseTcp);
                    }
                    debug!("IXFR over UDP demands TCP, retrying");
                    self.sock = None;
                    self.udp_mode = UdpMode::Never;
                    if self.begun {
                        self.txn.finish(false);
                        self.begun = false;
                    }
                }
                Err(error) => {
                    self.abort();
                    return Err(error);
                }
            }
        }
    }

    fn abort(&mut self) {
        self.done = true;
        if self.begun {
            self.txn.finish(false);
            self.begun = false;
        }
    }
}

impl Drop for XfrStream<'_> {
    fn drop(&mut self) {
        if self.begun && !self.done {
            self.txn.finish(false);
        }
    }
}

/// Run a transfer and apply it through the transaction manager, draining
/// the message stream.
pub async fn inbound_xfr(
    where_: IpAddr,
    txn: &mut (dyn TransactionManager + Send),
    query: Option<Query>,
    options: XfrOptions,
) -> Result<()> {
    let mut stream = XfrStream::start(where_, Box::new(txn), query, options).await?;
    while stream.next_message().await?.is_some() {}
    Ok(())
}

/// Start a transfer that only yields messages, without applying records
/// anywhere.  UDP is only legal for IXFR.
pub async fn xfr(
    where_: IpAddr,
    zone: &Name,
    rdclass: DnsClass,
    use_udp: bool,
    options: XfrOptions,
) -> Result<XfrStream<'static>> {
    if use_udp && options.rdtype != RecordType::IXFR {
        return Err(Error::InvalidArgument("cannot do a UDP AXFR".to_string()));
    }
    let mut options = options;
    options.udp_mode = if use_udp { UdpMode::Only } else { UdpMode::Never };
    let txn = Box::new(SoaWatcher::new(zone.clone(), rdclass));
    XfrStream::start(where_, txn, None, options).await
}

/// A transaction manager that applies nothing and just watches the SOA
/// records to decide when a transfer is complete: the transfer ends when
/// the initial SOA serial comes around again.  Over UDP it recognizes the
/// single-SOA "already current" IXFR reply and demands TCP when the reply
/// does not start with a SOA.
pub struct SoaWatcher {
    origin: Name,
    rdclass: DnsClass,
    rdtype: RecordType,
    is_udp: bool,
    initial_serial: Option<u32>,
    records_seen: usize,
}

impl SoaWatcher {
    pub fn new(origin: Name, rdclass: DnsClass) -> SoaWatcher {
        SoaWatcher {
            origin,
            rdclass,
            rdtype: RecordType::AXFR,
            is_udp: false,
            initial_serial: None,
            records_seen: 0,
        }
    }
}

impl TransactionManager for SoaWatcher {
    fn origin(&self) -> &Name {
        &self.origin
    }

    fn rdclass(&self) -> DnsClass {
        self.rdclass
    }

    fn begin(&mut self, rdtype: RecordType, _base_serial: u32, is_udp: bool) -> Result<()> {
        self.rdtype = rdtype;
        self.is_udp = is_udp;
        self.initial_serial = None;
        self.records_seen = 0;
        Ok(())
    }

    fn process_message(&mut self, message: &Message) -> Result<bool> {
        if message.rcode() != Rcode::NOERROR {
            return Err(Error::Transfer(format!(
                "zone transfer failed with rcode {}",
                message.rcode().name()
            )));
        }
        let mut done = false;
        for rr in &message.answer {
            if self.records_seen == 0 {
                match (rr.rdtype, &rr.rdata) {
                    (RecordType::SOA, Some(Rdata::Soa { serial, .. })) => {
                        self.initial_serial = Some(*serial);
                    }
                    _ if self.is_udp => return Err(Error::UseTcp),
                    _ => {
                        return Err(Error::Transfer(
                            "first transfer record is not a SOA".to_string(),
                        ))
                    }
                }
                self.records_seen = 1;
                continue;
            }
            self.records_seen += 1;
            if rr.rdtype == RecordType::SOA {
                if let Some(Rdata::Soa { serial, .. }) = &rr.rdata {
                    if Some(*serial) == self.initial_serial {
                        done = true;
                    }
                }
            }
        }
        // a lone SOA answer to a UDP IXFR means the zone is already current
        if self.is_udp
            && self.rdtype == RecordType::IXFR
            && self.records_seen == 1
            && message.answer.len() == 1
        {
            done = true;
        }
        Ok(done)
    }
}
