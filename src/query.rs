use rand::Rng;

use crate::wire::{flags, DnsClass, EdnsOption, Message, Name, Opcode, Rcode, Rdata, RecordType};

/// A question in an outgoing query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryQuestion {
    pub name: Name,
    pub rdclass: DnsClass,
    pub rdtype: RecordType,
}

/// A record carried in an outgoing query (IXFR base SOA, EDNS OPT, TSIG).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    pub name: Name,
    pub rdclass: DnsClass,
    pub rdtype: RecordType,
    pub ttl: u32,
    pub rdata: Rdata,
}

/// An outgoing query: just enough construction machinery for the
/// transports.  Names are written uncompressed.
#[derive(Debug, Clone)]
pub struct Query {
    pub id: u16,
    pub flags: u16,
    question: Vec<QueryQuestion>,
    authority: Vec<QueryRecord>,
    additional: Vec<QueryRecord>,
    signed: bool,
}

impl Query {
    /// A recursion-desired query with a random id, the way stub queries are
    /// normally built.
    pub fn new(name: Name, rdtype: RecordType, rdclass: DnsClass) -> Query {
        let mut rng = rand::thread_rng();
        Query {
            id: rng.gen::<u16>(),
            flags: flags::RD,
            question: vec![QueryQuestion {
                name,
                rdclass,
                rdtype,
            }],
            authority: Vec::new(),
            additional: Vec::new(),
            signed: false,
        }
    }

    pub fn set_id(&mut self, id: u16) {
        self.id = id;
    }

    pub fn question(&self) -> &[QueryQuestion] {
        &self.question
    }

    pub fn authority(&self) -> &[QueryRecord] {
        &self.authority
    }

    pub fn add_authority(&mut self, record: QueryRecord) {
        self.authority.push(record);
    }

    /// EDNS passthrough: advertise a payload size and carry the caller's
    /// options verbatim.
    pub fn set_edns(&mut self, udp_payload: u16, ednsflags: u32, options: Vec<EdnsOption>) {
        self.additional.retain(|rr| rr.rdtype != RecordType::OPT);
        self.additional.push(QueryRecord {
            name: Name::root(),
            rdclass: DnsClass::from(udp_payload),
            rdtype: RecordType::OPT,
            ttl: ednsflags,
            rdata: Rdata::Opt(options),
        });
    }

    /// Attach an externally built TSIG record.  The library checks TSIG
    /// presence rules during transfers; computing and validating the MAC
    /// belongs to the signer that produced this record.
    pub fn attach_tsig(&mut self, key_name: Name, rdata: Rdata) {
        self.additional.push(QueryRecord {
            name: key_name,
            rdclass: DnsClass::ANY,
            rdtype: RecordType::TSIG,
            ttl: 0,
            rdata,
        });
        self.signed = true;
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(512);
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&(self.question.len() as u16).to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&(self.authority.len() as u16).to_be_bytes());
        buf.extend_from_slice(&(self.additional.len() as u16).to_be_bytes());
        for question in &self.question {
            question.name.to_wire(&mut buf);
            buf.extend_from_slice(&question.rdtype.to_u16().to_be_bytes());
            buf.extend_from_slice(&question.rdclass.to_u16().to_be_bytes());
        }
        for record in self.authority.iter().chain(self.additional.iter()) {
            record.name.to_wire(&mut buf);
            buf.extend_from_slice(&record.rdtype.to_u16().to_be_bytes());
            buf.extend_from_slice(&record.rdclass.to_u16().to_be_bytes());
            buf.extend_from_slice(&record.ttl.to_be_bytes());
            let mut rdata = Vec::new();
            record.rdata.to_wire(&mut rdata);
            buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
            buf.extend_from_slice(&rdata);
        }
        buf
    }

    /// Is `other` a response to this query?  Matching id, opcode, and
    /// question are required; a FORMERR reply is exempt from the question
    /// comparison since the server may not have echoed it.
    pub fn is_response(&self, other: &Message) -> bool {
        if other.flags & flags::QR == 0 {
            return false;
        }
        if self.id != other.id {
            return false;
        }
        if Opcode::from_flags(self.flags) != other.opcode() {
            return false;
        }
        if other.rcode() != Rcode::FORMERR {
            let theirs: Vec<(&Name, DnsClass, RecordType)> = other
                .question
                .iter()
                .map(|q| (&q.name, q.rdclass, q.rdtype))
                .collect();
            let ours: Vec<(&Name, DnsClass, RecordType)> = self
                .question
                .iter()
                .map(|q| (&q.name, q.rdclass, q.rdtype))
                .collect();
            if ours.iter().any(|q| !theirs.contains(q)) {
                return false;
            }
            if theirs.iter().any(|q| !ours.contains(q)) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire;

    #[test]
    fn test_query_wire_layout() {
        let mut q = Query::new(
            Name::from_text("example.com").unwrap(),
            RecordType::A,
            DnsClass::IN,
        );
        q.set_id(0x1234);
        let buf = q.to_wire();
        assert_eq!(&buf[..4], &[0x12, 0x34, 0x01, 0x00]);
        assert_eq!(&buf[4..12], &[0, 1, 0, 0, 0, 0, 0, 0]);
        let parsed = wire::Message::from_wire(buf);
        assert!(parsed.error.is_none());
        assert_eq!(parsed.question.len(), 1);
        assert_eq!(parsed.question[0].name.to_text(), "example.com.");
    }

    #[test]
    fn test_is_response() {
        let mut q = Query::new(
            Name::from_text("example.com").unwrap(),
            RecordType::A,
            DnsClass::IN,
        );
        q.set_id(0x0102);
        let mut wire = q.to_wire();
        // not a response until QR is set
        let parsed = wire::Message::from_wire(wire.clone());
        assert!(!q.is_response(&parsed));
        wire[2] |= 0x80;
        let parsed = wire::Message::from_wire(wire.clone());
        assert!(q.is_response(&parsed));
        // id mismatch
        wire[0] = 0xff;
        let parsed = wire::Message::from_wire(wire.clone());
        assert!(!q.is_response(&parsed));
        wire[0] = 0x01;
        // question mismatch
        let qtype_hi_idx = wire.len() - 4;
        let qtype_lo_idx = wire.len() - 3;
        wire[qtype_hi_idx] = 0x00;
        wire[qtype_lo_idx] = 0x02;
        let parsed = wire::Message::from_wire(wire.clone());
        assert!(!q.is_response(&parsed));
        // ... unless the reply is a FORMERR
        wire[3] |= 0x01;
        let parsed = wire::Message::from_wire(wire);
        assert!(q.is_response(&parsed));
    }

    #[test]
    fn test_edns_passthrough() {
        let mut q = Query::new(
            Name::from_text("example.com").unwrap(),
            RecordType::A,
            DnsClass::IN,
        );
        q.set_edns(4096, 0, Vec::new());
        let parsed = wire::Message::from_wire(q.to_wire());
        assert!(parsed.error.is_none());
        assert_eq!(parsed.additional.len(), 1);
        assert_eq!(parsed.additional[0].rdtype, RecordType::OPT);
        assert_eq!(parsed.additional[0].rdclass, DnsClass::Unknown(4096));
    }
}
