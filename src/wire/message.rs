use std::fmt::Write as _;
use std::time::Duration;

use crate::error::{Error, WireError};
use crate::wire::name::Name;
use crate::wire::parser::Parser;
use crate::wire::rdata::Rdata;
use crate::wire::types::{flags, DnsClass, Opcode, Rcode, RecordType};

/// A question, with the byte range it occupied.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub name: Name,
    pub rdclass: DnsClass,
    pub rdtype: RecordType,
    pub start: usize,
    pub end: usize,
}

impl Question {
    pub fn to_text(&self) -> String {
        format!(
            "{} {} {}",
            self.name.to_text(),
            self.rdclass.name(),
            self.rdtype.name()
        )
    }
}

/// The first byte at which parsing could not proceed, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMark {
    pub offset: usize,
    pub cause: WireError,
}

/// A resource record, with byte offsets and an optional localized rdata
/// error.  `rdata` is `None` when the type-specific decoder failed (the
/// byte range still covers the declared rdlength) or when rdlength is 0.
#[derive(Debug, Clone, PartialEq)]
pub struct RR {
    pub name: Name,
    pub rdclass: DnsClass,
    pub rdtype: RecordType,
    pub ttl: u32,
    pub rdata: Option<Rdata>,
    pub start: usize,
    pub end: usize,
    pub rdata_start: usize,
    pub error: Option<ErrorMark>,
}

impl RR {
    pub fn rdlen(&self) -> usize {
        self.end - self.rdata_start
    }

    pub fn to_text(&self) -> String {
        let mut out = format!(
            "{} {} {} {}",
            self.name.to_text(),
            self.ttl,
            self.rdclass.name(),
            self.rdtype.name()
        );
        if let Some(rdata) = &self.rdata {
            out.push(' ');
            out.push_str(&rdata.to_text());
        }
        if let Some(error) = &self.error {
            let _ = write!(out, " ; error:{:04x}: {}", error.offset, error.cause);
        }
        out
    }
}

/// Options for the strict parse used by the transports.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub ignore_trailing: bool,
    pub raise_on_truncation: bool,
}

/// A DNS message that preserves its wire format.
///
/// Construction never fails: parse errors are localized.  A failure inside
/// a single record's rdata is attached to that record and parsing
/// continues; a failure in the outer record framing stops the parse and is
/// recorded in `error`, leaving the remaining sections empty.
#[derive(Debug, Clone)]
pub struct Message {
    pub wire: Vec<u8>,
    pub id: u16,
    pub flags: u16,
    pub qcount: u16,
    pub ancount: u16,
    pub aucount: u16,
    pub adcount: u16,
    pub question: Vec<Question>,
    pub answer: Vec<RR>,
    pub authority: Vec<RR>,
    pub additional: Vec<RR>,
    pub error: Option<ErrorMark>,
    pub trailing_offset: Option<usize>,
    /// Round-trip time, stamped by the transport that received this reply.
    pub time: Option<Duration>,
}

impl Message {
    pub fn from_wire(wire: Vec<u8>) -> Message {
        let mut msg = Message {
            wire,
            id: 0,
            flags: 0,
            qcount: 0,
            ancount: 0,
            aucount: 0,
            adcount: 0,
            question: Vec::new(),
            answer: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            error: None,
            trailing_offset: None,
            time: None,
        };
        let wire = std::mem::take(&mut msg.wire);
        {
            let mut parser = Parser::new(&wire);
            match Message::get_header(&mut parser) {
                Ok((id, flags, qcount, ancount, aucount, adcount)) => {
                    msg.id = id;
                    msg.flags = flags;
                    msg.qcount = qcount;
                    msg.ancount = ancount;
                    msg.aucount = aucount;
                    msg.adcount = adcount;
                }
                Err(cause) => {
                    msg.error = Some(ErrorMark {
                        offset: parser.current(),
                        cause,
                    });
                }
            }
            msg.question = msg.get_questions(&mut parser, msg.qcount);
            msg.answer = msg.get_rrs(&mut parser, msg.ancount);
            msg.authority = msg.get_rrs(&mut parser, msg.aucount);
            msg.additional = msg.get_rrs(&mut parser, msg.adcount);
            if msg.error.is_none() && parser.remaining() != 0 {
                msg.trailing_offset = Some(parser.current());
            }
        }
        msg.wire = wire;
        msg
    }

    // The header is read all-or-nothing so a short buffer leaves the
    // cursor (and the error offset) at 0.
    fn get_header(parser: &mut Parser<'_>) -> Result<(u16, u16, u16, u16, u16, u16), WireError> {
        let b = parser.get_bytes(12)?;
        Ok((
            u16::from_be_bytes([b[0], b[1]]),
            u16::from_be_bytes([b[2], b[3]]),
            u16::from_be_bytes([b[4], b[5]]),
            u16::from_be_bytes([b[6], b[7]]),
            u16::from_be_bytes([b[8], b[9]]),
            u16::from_be_bytes([b[10], b[11]]),
        ))
    }

    fn get_questions(&mut self, parser: &mut Parser<'_>, count: u16) -> Vec<Question> {
        if self.error.is_some() {
            return Vec::new();
        }
        let mut records = Vec::new();
        for _ in 0..count {
            let start = parser.current();
            let parsed: Result<Question, WireError> = (|| {
                let name = parser.get_name()?;
                let rdtype = RecordType::from(parser.get_u16()?);
                let rdclass = DnsClass::from(parser.get_u16()?);
                Ok(Question {
                    name,
                    rdclass,
                    rdtype,
                    start,
                    end: parser.current(),
                })
            })();
            match parsed {
                Ok(question) => records.push(question),
                Err(cause) => {
                    let _ = parser.seek(start);
                    self.error = Some(ErrorMark {
                        offset: parser.current(),
                        cause,
                    });
                    break;
                }
            }
        }
        records
    }

    fn get_rrs(&mut self, parser: &mut Parser<'_>, count: u16) -> Vec<RR> {
        if self.error.is_some() {
            return Vec::new();
        }
        let mut records = Vec::new();
        for _ in 0..count {
            let start = parser.current();
            let parsed: Result<RR, WireError> = (|| {
                let name = parser.get_name()?;
                let rdtype = RecordType::from(parser.get_u16()?);
                let rdclass = DnsClass::from(parser.get_u16()?);
                let ttl = parser.get_u32()?;
                let rdlen = parser.get_u16()? as usize;
                let rdata_start = parser.current();
                let mut rdata = None;
                let mut error = None;
                if rdlen > 0 {
                    let saved_end = parser.restrict_to(rdlen)?;
                    match Rdata::from_wire(rdtype, parser) {
                        Ok(decoded) => rdata = Some(decoded),
                        Err(cause) => {
                            error = Some(ErrorMark {
                                offset: parser.current(),
                                cause,
                            });
                            parser.seek(rdata_start + rdlen)?;
                        }
                    }
                    parser.restore_end(saved_end);
                }
                Ok(RR {
                    name,
                    rdclass,
                    rdtype,
                    ttl,
                    rdata,
                    start,
                    end: parser.current(),
                    rdata_start,
                    error,
                })
            })();
            match parsed {
                Ok(rr) => records.push(rr),
                Err(cause) => {
                    let _ = parser.seek(start);
                    self.error = Some(ErrorMark {
                        offset: parser.current(),
                        cause,
                    });
                    break;
                }
            }
        }
        records
    }

    pub fn opcode(&self) -> Opcode {
        Opcode::from_flags(self.flags)
    }

    /// The OPT TTL field, which re-encodes extended flags and RCODE bits.
    pub fn ednsflags(&self) -> u32 {
        for rr in &self.additional {
            if rr.rdtype == RecordType::OPT && rr.name.is_root() {
                return rr.ttl;
            }
        }
        0
    }

    pub fn rcode(&self) -> Rcode {
        Rcode::from_flags(self.flags, self.ednsflags())
    }

    pub fn is_truncated(&self) -> bool {
        self.flags & flags::TC != 0
    }

    pub fn tsig(&self) -> Option<&RR> {
        self.additional
            .iter()
            .find(|rr| rr.rdtype == RecordType::TSIG)
    }

    pub fn had_tsig(&self) -> bool {
        self.tsig().is_some()
    }

    /// The MAC of this message's TSIG, for threading into the next parse of
    /// a multi-message transfer.
    pub fn tsig_mac(&self) -> Option<Vec<u8>> {
        match self.tsig()?.rdata.as_ref()? {
            Rdata::Tsig { mac, .. } => Some(mac.clone()),
            _ => None,
        }
    }

    fn annotate_slice(&self, out: &mut String, start: usize, end: usize, annotation: &str) {
        const MAX_BYTES: usize = 16;
        let end = end.min(self.wire.len());
        let mut pad_before = start % MAX_BYTES;
        let mut pos = start;
        while pos < end {
            let _ = write!(out, "{:04x}: ", pos);
            let amount = (end - pos).min(MAX_BYTES - pad_before);
            let pad_after = MAX_BYTES - amount - pad_before;
            if pad_before > 0 {
                for _ in 0..pad_before {
                    out.push_str("  ");
                }
                pad_before = 0;
            }
            for b in &self.wire[pos..pos + amount] {
                let _ = write!(out, "{:02x}", b);
            }
            if pos == start && !annotation.is_empty() {
                for _ in 0..pad_after {
                    out.push_str("  ");
                }
                out.push_str(" ; ");
                out.push_str(annotation);
            }
            out.push('\n');
            pos += amount;
        }
    }

    fn rr_section_to_text(&self, out: &mut String, section: &[RR], section_name: &str) {
        let _ = writeln!(out, "; {}", section_name);
        for rr in section {
            self.annotate_slice(out, rr.start, rr.end, &rr.to_text());
        }
    }

    /// Annotated hex dump: 16 bytes per line, each logical element
    /// commented on the line where it begins.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("; HEADER\n");
        self.annotate_slice(&mut out, 0, 2, &format!("id = {}", self.id));
        let flags_text = format!(
            "{} {} {}",
            self.opcode().name(),
            flags::to_text(self.flags),
            self.rcode().name()
        );
        self.annotate_slice(&mut out, 2, 4, &format!("flags = {}", flags_text));
        self.annotate_slice(&mut out, 4, 6, &format!("qcount = {}", self.qcount));
        self.annotate_slice(&mut out, 6, 8, &format!("ancount = {}", self.ancount));
        self.annotate_slice(&mut out, 8, 10, &format!("aucount = {}", self.aucount));
        self.annotate_slice(&mut out, 10, 12, &format!("adcount = {}", self.adcount));
        out.push_str("; QUESTION\n");
        for question in &self.question {
            self.annotate_slice(&mut out, question.start, question.end, &question.to_text());
        }
        self.rr_section_to_text(&mut out, &self.answer, "ANSWER");
        self.rr_section_to_text(&mut out, &self.authority, "AUTHORITY");
        self.rr_section_to_text(&mut out, &self.additional, "ADDITIONAL");
        if let Some(error) = &self.error {
            out.push_str("; ERROR\n");
            self.annotate_slice(
                &mut out,
                error.offset,
                self.wire.len(),
                &format!("error:{:04x}: {}", error.offset, error.cause),
            );
        } else if let Some(trailing) = self.trailing_offset {
            out.push_str("; TRAILING\n");
            self.annotate_slice(&mut out, trailing, self.wire.len(), "");
        }
        let _ = write!(out, "; total length = {}", self.wire.len());
        out
    }
}

/// Strict parse for transport replies: message-level errors and per-record
/// rdata errors become hard failures, trailing junk is rejected unless
/// allowed, and a set TC bit can be escalated to `Truncated` carrying the
/// parsed message.
pub fn parse_message(wire: Vec<u8>, options: &ParseOptions) -> Result<Message, Error> {
    let message = Message::from_wire(wire);
    if let Some(error) = &message.error {
        return Err(Error::Wire(error.cause.clone()));
    }
    for section in [&message.answer, &message.authority, &message.additional] {
        for rr in section {
            if let Some(error) = &rr.error {
                return Err(Error::Wire(error.cause.clone()));
            }
        }
    }
    if message.trailing_offset.is_some() && !options.ignore_trailing {
        return Err(Error::Wire(WireError::TrailingJunk));
    }
    if options.raise_on_truncation && message.is_truncated() {
        return Err(Error::Truncated {
            message: Box::new(message),
        });
    }
    Ok(message)
}
