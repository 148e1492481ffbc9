//! Shared helpers: build wire-format responses for miniature test servers.
#![allow(dead_code)]

use wiredns::wire::{DnsClass, Message, Rdata, RecordType};
use wiredns::Name;

pub struct TestAnswer {
    pub name: Name,
    pub rdtype: RecordType,
    pub ttl: u32,
    pub rdata: Rdata,
}

pub fn answer(name: &str, rdtype: RecordType, ttl: u32, rdata: Rdata) -> TestAnswer {
    TestAnswer {
        name: Name::from_text(name).unwrap(),
        rdtype,
        ttl,
        rdata,
    }
}

/// Build a response to `query_wire`: same id and question, QR set, and the
/// given answer records.
pub fn build_response(query_wire: &[u8], answers: &[TestAnswer], truncated: bool) -> Vec<u8> {
    let query = Message::from_wire(query_wire.to_vec());
    assert!(query.error.is_none(), "test query must parse");
    let mut out = Vec::new();
    out.extend_from_slice(&query.id.to_be_bytes());
    let mut flags = 0x8180u16;
    if truncated {
        flags |= 0x0200;
    }
    out.extend_from_slice(&flags.to_be_bytes());
    out.extend_from_slice(&(query.question.len() as u16).to_be_bytes());
    out.extend_from_slice(&(answers.len() as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    for question in &query.question {
        question.name.to_wire(&mut out);
        out.extend_from_slice(&question.rdtype.to_u16().to_be_bytes());
        out.extend_from_slice(&question.rdclass.to_u16().to_be_bytes());
    }
    for answer in answers {
        answer.name.to_wire(&mut out);
        out.extend_from_slice(&answer.rdtype.to_u16().to_be_bytes());
        out.extend_from_slice(&DnsClass::IN.to_u16().to_be_bytes());
        out.extend_from_slice(&answer.ttl.to_be_bytes());
        let mut rdata = Vec::new();
        answer.rdata.to_wire(&mut rdata);
        out.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        out.extend_from_slice(&rdata);
    }
    out
}

pub fn soa(serial: u32) -> Rdata {
    Rdata::Soa {
        mname: Name::from_text("ns1.example.org").unwrap(),
        rname: Name::from_text("hostmaster.example.org").unwrap(),
        serial,
        refresh: 7200,
        retry: 900,
        expire: 1209600,
        minimum: 300,
    }
}
