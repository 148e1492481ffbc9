/// DNS record types, including the pseudo and transfer types the query
/// engine needs to recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    NONE,
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    OPT, // EDNS
    DS,
    RRSIG,
    NSEC,
    DNSKEY,
    NSEC3,
    TSIG,
    IXFR,
    AXFR,
    ANY,
    Unknown(u16),
}

impl From<u16> for RecordType {
    fn from(v: u16) -> Self {
        match v {
            0 => RecordType::NONE,
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            41 => RecordType::OPT,
            43 => RecordType::DS,
            46 => RecordType::RRSIG,
            47 => RecordType::NSEC,
            48 => RecordType::DNSKEY,
            50 => RecordType::NSEC3,
            250 => RecordType::TSIG,
            251 => RecordType::IXFR,
            252 => RecordType::AXFR,
            255 => RecordType::ANY,
            other => RecordType::Unknown(other),
        }
    }
}

impl RecordType {
    pub fn to_u16(&self) -> u16 {
        match self {
            RecordType::NONE => 0,
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::OPT => 41,
            RecordType::DS => 43,
            RecordType::RRSIG => 46,
            RecordType::NSEC => 47,
            RecordType::DNSKEY => 48,
            RecordType::NSEC3 => 50,
            RecordType::TSIG => 250,
            RecordType::IXFR => 251,
            RecordType::AXFR => 252,
            RecordType::ANY => 255,
            RecordType::Unknown(v) => *v,
        }
    }

    pub fn name(&self) -> String {
        match self {
            RecordType::NONE => "NONE".into(),
            RecordType::A => "A".into(),
            RecordType::NS => "NS".into(),
            RecordType::CNAME => "CNAME".into(),
            RecordType::SOA => "SOA".into(),
            RecordType::PTR => "PTR".into(),
            RecordType::MX => "MX".into(),
            RecordType::TXT => "TXT".into(),
            RecordType::AAAA => "AAAA".into(),
            RecordType::SRV => "SRV".into(),
            RecordType::OPT => "OPT".into(),
            RecordType::DS => "DS".into(),
            RecordType::RRSIG => "RRSIG".into(),
            RecordType::NSEC => "NSEC".into(),
            RecordType::DNSKEY => "DNSKEY".into(),
            RecordType::NSEC3 => "NSEC3".into(),
            RecordType::TSIG => "TSIG".into(),
            RecordType::IXFR => "IXFR".into(),
            RecordType::AXFR => "AXFR".into(),
            RecordType::ANY => "ANY".into(),
            RecordType::Unknown(v) => format!("TYPE{}", v),
        }
    }
}

/// DNS class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsClass {
    IN,
    CH,
    HS,
    NONE,
    ANY,
    Unknown(u16),
}

impl From<u16> for DnsClass {
    fn from(v: u16) -> Self {
        match v {
            1 => DnsClass::IN,
            3 => DnsClass::CH,
            4 => DnsClass::HS,
            254 => DnsClass::NONE,
            255 => DnsClass::ANY,
            other => DnsClass::Unknown(other),
        }
    }
}

impl DnsClass {
    pub fn to_u16(&self) -> u16 {
        match self {
            DnsClass::IN => 1,
            DnsClass::CH => 3,
            DnsClass::HS => 4,
            DnsClass::NONE => 254,
            DnsClass::ANY => 255,
            DnsClass::Unknown(v) => *v,
        }
    }

    pub fn name(&self) -> String {
        match self {
            DnsClass::IN => "IN".into(),
            DnsClass::CH => "CH".into(),
            DnsClass::HS => "HS".into(),
            DnsClass::NONE => "NONE".into(),
            DnsClass::ANY => "ANY".into(),
            DnsClass::Unknown(v) => format!("CLASS{}", v),
        }
    }
}

/// Header flag bits (RFC 1035 plus AD/CD from RFC 4035).
pub mod flags {
    pub const QR: u16 = 0x8000;
    pub const AA: u16 = 0x0400;
    pub const TC: u16 = 0x0200;
    pub const RD: u16 = 0x0100;
    pub const RA: u16 = 0x0080;
    pub const AD: u16 = 0x0020;
    pub const CD: u16 = 0x0010;

    const ORDER: [(u16, &str); 7] = [
        (QR, "QR"),
        (AA, "AA"),
        (TC, "TC"),
        (RD, "RD"),
        (RA, "RA"),
        (AD, "AD"),
        (CD, "CD"),
    ];

    /// Render the set flag bits in canonical order.
    pub fn to_text(flags: u16) -> String {
        let names: Vec<&str> = ORDER
            .iter()
            .filter(|(bit, _)| flags & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        names.join(" ")
    }
}

/// Header opcode (bits 11-14 of the flags word).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Query,
    IQuery,
    Status,
    Notify,
    Update,
    Unknown(u8),
}

impl Opcode {
    pub fn from_flags(flags: u16) -> Opcode {
        match (flags >> 11) & 0xF {
            0 => Opcode::Query,
            1 => Opcode::IQuery,
            2 => Opcode::Status,
            4 => Opcode::Notify,
            5 => Opcode::Update,
            other => Opcode::Unknown(other as u8),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Opcode::Query => "QUERY".into(),
            Opcode::IQuery => "IQUERY".into(),
            Opcode::Status => "STATUS".into(),
            Opcode::Notify => "NOTIFY".into(),
            Opcode::Update => "UPDATE".into(),
            Opcode::Unknown(v) => format!("OPCODE{}", v),
        }
    }
}

/// Response code, possibly extended through the OPT TTL field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rcode(pub u16);

impl Rcode {
    pub const NOERROR: Rcode = Rcode(0);
    pub const FORMERR: Rcode = Rcode(1);
    pub const SERVFAIL: Rcode = Rcode(2);
    pub const NXDOMAIN: Rcode = Rcode(3);
    pub const NOTIMP: Rcode = Rcode(4);
    pub const REFUSED: Rcode = Rcode(5);

    /// Effective rcode: the OPT TTL supplies the high eight bits.
    pub fn from_flags(flags: u16, ednsflags: u32) -> Rcode {
        let value = (flags & 0x000F) | (((ednsflags >> 20) & 0xFF0) as u16);
        Rcode(value)
    }

    pub fn name(&self) -> String {
        match self.0 {
            0 => "NOERROR".into(),
            1 => "FORMERR".into(),
            2 => "SERVFAIL".into(),
            3 => "NXDOMAIN".into(),
            4 => "NOTIMP".into(),
            5 => "REFUSED".into(),
            6 => "YXDOMAIN".into(),
            7 => "YXRRSET".into(),
            8 => "NXRRSET".into(),
            9 => "NOTAUTH".into(),
            10 => "NOTZONE".into(),
            16 => "BADVERS".into(),
            17 => "BADKEY".into(),
            18 => "BADTIME".into(),
            19 => "BADMODE".into(),
            20 => "BADNAME".into(),
            21 => "BADALG".into(),
            22 => "BADTRUNC".into(),
            23 => "BADCOOKIE".into(),
            v => format!("RCODE{}", v),
        }
    }
}
