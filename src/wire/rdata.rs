use std::fmt::Write as _;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::WireError;
use crate::wire::name::Name;
use crate::wire::parser::Parser;
use crate::wire::types::RecordType;

/// A single EDNS option carried in an OPT record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

/// Decoded rdata for the types this library understands; anything else is
/// kept as opaque bytes.  Decoding happens against the message-level parser
/// so names inside rdata may use compression; encoding never compresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rdata {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Ptr(Name),
    Mx {
        preference: u16,
        exchange: Name,
    },
    Soa {
        mname: Name,
        rname: Name,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Txt(Vec<Vec<u8>>),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: Name,
    },
    Opt(Vec<EdnsOption>),
    Tsig {
        algorithm: Name,
        time_signed: u64,
        fudge: u16,
        mac: Vec<u8>,
        original_id: u16,
        error: u16,
        other: Vec<u8>,
    },
    Unknown(Vec<u8>),
}

impl Rdata {
    /// Decode rdata from a parser restricted to the record's rdlength.
    /// Decoders must consume the region exactly; leftover bytes are a
    /// form error.
    pub fn from_wire(rdtype: RecordType, parser: &mut Parser<'_>) -> Result<Rdata, WireError> {
        let rdata = match rdtype {
            RecordType::A => {
                let b = parser.get_remaining()?;
                if b.len() != 4 {
                    return Err(WireError::Malformed);
                }
                Rdata::A(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
            }
            RecordType::AAAA => {
                let b = parser.get_remaining()?;
                let octets: [u8; 16] = b.try_into().map_err(|_| WireError::Malformed)?;
                Rdata::Aaaa(Ipv6Addr::from(octets))
            }
            RecordType::NS => Rdata::Ns(parser.get_name()?),
            RecordType::CNAME => Rdata::Cname(parser.get_name()?),
            RecordType::PTR => Rdata::Ptr(parser.get_name()?),
            RecordType::MX => Rdata::Mx {
                preference: parser.get_u16()?,
                exchange: parser.get_name()?,
            },
            RecordType::SOA => Rdata::Soa {
                mname: parser.get_name()?,
                rname: parser.get_name()?,
                serial: parser.get_u32()?,
                refresh: parser.get_u32()?,
                retry: parser.get_u32()?,
                expire: parser.get_u32()?,
                minimum: parser.get_u32()?,
            },
            RecordType::TXT => {
                let mut strings = Vec::new();
                while parser.remaining() > 0 {
                    strings.push(parser.get_counted_bytes()?.to_vec());
                }
                Rdata::Txt(strings)
            }
            RecordType::SRV => Rdata::Srv {
                priority: parser.get_u16()?,
                weight: parser.get_u16()?,
                port: parser.get_u16()?,
                target: parser.get_name()?,
            },
            RecordType::OPT => {
                let mut options = Vec::new();
                while parser.remaining() > 0 {
                    let code = parser.get_u16()?;
                    let len = parser.get_u16()? as usize;
                    options.push(EdnsOption {
                        code,
                        data: parser.get_bytes(len)?.to_vec(),
                    });
                }
                Rdata::Opt(options)
            }
            RecordType::TSIG => {
                let algorithm = parser.get_name()?;
                let time_high = parser.get_u16()? as u64;
                let time_low = parser.get_u32()? as u64;
                let fudge = parser.get_u16()?;
                let mac_len = parser.get_u16()? as usize;
                let mac = parser.get_bytes(mac_len)?.to_vec();
                let original_id = parser.get_u16()?;
                let error = parser.get_u16()?;
                let other_len = parser.get_u16()? as usize;
                let other = parser.get_bytes(other_len)?.to_vec();
                Rdata::Tsig {
                    algorithm,
                    time_signed: time_high << 32 | time_low,
                    fudge,
                    mac,
                    original_id,
                    error,
                    other,
                }
            }
            _ => Rdata::Unknown(parser.get_remaining()?.to_vec()),
        };
        if parser.remaining() != 0 {
            return Err(WireError::Malformed);
        }
        Ok(rdata)
    }

    /// Append the uncompressed wire form.
    pub fn to_wire(&self, buf: &mut Vec<u8>) {
        match self {
            Rdata::A(addr) => buf.extend_from_slice(&addr.octets()),
            Rdata::Aaaa(addr) => buf.extend_from_slice(&addr.octets()),
            Rdata::Ns(name) | Rdata::Cname(name) | Rdata::Ptr(name) => name.to_wire(buf),
            Rdata::Mx {
                preference,
                exchange,
            } => {
                buf.extend_from_slice(&preference.to_be_bytes());
                exchange.to_wire(buf);
            }
            Rdata::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.to_wire(buf);
                rname.to_wire(buf);
                for v in [serial, refresh, retry, expire, minimum] {
                    buf.extend_from_slice(&v.to_be_bytes());
                }
            }
            Rdata::Txt(strings) => {
                for s in strings {
                    buf.push(s.len() as u8);
                    buf.extend_from_slice(s);
                }
            }
            Rdata::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                buf.extend_from_slice(&priority.to_be_bytes());
                buf.extend_from_slice(&weight.to_be_bytes());
                buf.extend_from_slice(&port.to_be_bytes());
                target.to_wire(buf);
            }
            Rdata::Opt(options) => {
                for opt in options {
                    buf.extend_from_slice(&opt.code.to_be_bytes());
                    buf.extend_from_slice(&(opt.data.len() as u16).to_be_bytes());
                    buf.extend_from_slice(&opt.data);
                }
            }
            Rdata::Tsig {
                algorithm,
                time_signed,
                fudge,
                mac,
                original_id,
                error,
                other,
            } => {
                algorithm.to_wire(buf);
                buf.extend_from_slice(&((time_signed >> 32) as u16).to_be_bytes());
                buf.extend_from_slice(&(*time_signed as u32).to_be_bytes());
                buf.extend_from_slice(&fudge.to_be_bytes());
                buf.extend_from_slice(&(mac.len() as u16).to_be_bytes());
                buf.extend_from_slice(mac);
                buf.extend_from_slice(&original_id.to_be_bytes());
                buf.extend_from_slice(&error.to_be_bytes());
                buf.extend_from_slice(&(other.len() as u16).to_be_bytes());
                buf.extend_from_slice(other);
            }
            Rdata::Unknown(bytes) => buf.extend_from_slice(bytes),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Rdata::A(addr) => addr.to_string(),
            Rdata::Aaaa(addr) => addr.to_string(),
            Rdata::Ns(name) | Rdata::Cname(name) | Rdata::Ptr(name) => name.to_text(),
            Rdata::Mx {
                preference,
                exchange,
            } => format!("{} {}", preference, exchange),
            Rdata::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => format!(
                "{} {} {} {} {} {} {}",
                mname, rname, serial, refresh, retry, expire, minimum
            ),
            Rdata::Txt(strings) => {
                let quoted: Vec<String> = strings
                    .iter()
                    .map(|s| format!("\"{}\"", String::from_utf8_lossy(s)))
                    .collect();
                quoted.join(" ")
            }
            Rdata::Srv {
                priority,
                weight,
                port,
                target,
            } => format!("{} {} {} {}", priority, weight, port, target),
            Rdata::Tsig {
                algorithm,
                time_signed,
                fudge,
                mac,
                original_id,
                error,
                ..
            } => format!(
                "{} {} {} {} {} {}",
                algorithm,
                time_signed,
                fudge,
                hex(mac),
                original_id,
                error
            ),
            Rdata::Opt(_) => {
                let mut buf = Vec::new();
                self.to_wire(&mut buf);
                generic_text(&buf)
            }
            Rdata::Unknown(bytes) => generic_text(bytes),
        }
    }
}

// RFC 3597 generic rdata presentation.
fn generic_text(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        "\\# 0".to_string()
    } else {
        format!("\\# {} {}", bytes.len(), hex(bytes))
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
