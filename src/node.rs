//! DNS nodes: sets of rdatasets keyed by `(class, type, covers)`.
//!
//! A node is either a CNAME node (CNAME plus the DNSSEC proof types) or an
//! "other data" node; mutations keep that invariant by purging whichever
//! side the incoming rdataset is incompatible with, so the most recent
//! change always wins.

use crate::wire::{DnsClass, Name, Rdata, RecordType};

/// A set of rdatas sharing `(class, type, covers)`.  `covers` is
/// `RecordType::NONE` except for RRSIG/SIG, where it names the signed type
/// so RRSIG(A) and RRSIG(NS) stay distinct sets.
#[derive(Debug, Clone, PartialEq)]
pub struct Rdataset {
    pub rdclass: DnsClass,
    pub rdtype: RecordType,
    pub covers: RecordType,
    pub ttl: u32,
    pub rdatas: Vec<Rdata>,
}

impl Rdataset {
    pub fn new(rdclass: DnsClass, rdtype: RecordType, covers: RecordType) -> Rdataset {
        Rdataset {
            rdclass,
            rdtype,
            covers,
            ttl: 0,
            rdatas: Vec::new(),
        }
    }

    pub fn add(&mut self, rdata: Rdata, ttl: u32) {
        // the rdataset TTL is the minimum of its members'
        if self.rdatas.is_empty() || ttl < self.ttl {
            self.ttl = ttl;
        }
        if !self.rdatas.contains(&rdata) {
            self.rdatas.push(rdata);
        }
    }

    pub fn matches(&self, rdclass: DnsClass, rdtype: RecordType, covers: RecordType) -> bool {
        self.rdclass == rdclass && self.rdtype == rdtype && self.covers == covers
    }

    fn is_type_or_its_signature(&self, rdtypes: &[RecordType]) -> bool {
        rdtypes.contains(&self.rdtype)
            || (self.rdtype == RecordType::RRSIG && rdtypes.contains(&self.covers))
    }

    /// Does adding this rdataset make the node a CNAME node?
    pub fn implies_cname(&self) -> bool {
        self.is_type_or_its_signature(&[RecordType::CNAME])
    }

    /// May this rdataset coexist with a CNAME?  Only CNAME itself and the
    /// DNSSEC proof types (NSEC, NSEC3, and their RRSIGs) may.
    pub fn ok_for_cname(&self) -> bool {
        self.is_type_or_its_signature(&[RecordType::CNAME, RecordType::NSEC, RecordType::NSEC3])
    }

    /// Does adding this rdataset make the node an "other data" node?
    pub fn implies_other_data(&self) -> bool {
        !self.ok_for_cname()
    }

    /// May this rdataset coexist with other data?  Everything except CNAME
    /// and RRSIG(CNAME) may.
    pub fn ok_for_other_data(&self) -> bool {
        !self.is_type_or_its_signature(&[RecordType::CNAME])
    }
}

/// A named rdataset, as assembled from a message section.  Its matching
/// rules differ from a plain rdataset's, so it is converted on its way
/// into a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Rrset {
    pub name: Name,
    pub rdataset: Rdataset,
}

impl From<Rrset> for Rdataset {
    fn from(rrset: Rrset) -> Rdataset {
        rrset.rdataset
    }
}

/// A set of rdatasets at one name.
#[derive(Debug, Clone, Default)]
pub struct Node {
    rdatasets: Vec<Rdataset>,
}

impl Node {
    pub fn new() -> Node {
        Node::default()
    }

    pub fn len(&self) -> usize {
        self.rdatasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdatasets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rdataset> {
        self.rdatasets.iter()
    }

    /// Append with the CNAME/other-data discipline: an incoming CNAME
    /// purges everything that cannot live beside a CNAME, and incoming
    /// other data purges CNAME and RRSIG(CNAME).
    fn append_rdataset(&mut self, rdataset: Rdataset) {
        if !self.rdatasets.is_empty() {
            if rdataset.implies_cname() {
                self.rdatasets.retain(|rds| rds.ok_for_cname());
            } else if rdataset.implies_other_data() {
                self.rdatasets.retain(|rds| rds.ok_for_other_data());
            }
        }
        self.rdatasets.push(rdataset);
    }

    /// Find a matching rdataset, creating an empty one when `create` is
    /// set.  Returns `None` only when the rdataset is absent and `create`
    /// is false.
    pub fn find_rdataset(
        &mut self,
        rdclass: DnsClass,
        rdtype: RecordType,
        covers: RecordType,
        create: bool,
    ) -> Option<&mut Rdataset> {
        // indexed to sidestep borrowing the vec twice
        let found = self
            .rdatasets
            .iter()
            .position(|rds| rds.matches(rdclass, rdtype, covers));
        match found {
            Some(index) => Some(&mut self.rdatasets[index]),
            None if create => {
                self.append_rdataset(Rdataset::new(rdclass, rdtype, covers));
                self.rdatasets.last_mut()
            }
            None => None,
        }
    }

    /// Like [`find_rdataset`](Node::find_rdataset) without creation, for
    /// read-only callers.
    pub fn get_rdataset(
        &self,
        rdclass: DnsClass,
        rdtype: RecordType,
        covers: RecordType,
    ) -> Option<&Rdataset> {
        self.rdatasets
            .iter()
            .find(|rds| rds.matches(rdclass, rdtype, covers))
    }

    /// Delete a matching rdataset; absence is not an error.
    pub fn delete_rdataset(&mut self, rdclass: DnsClass, rdtype: RecordType, covers: RecordType) {
        self.rdatasets
            .retain(|rds| !rds.matches(rdclass, rdtype, covers));
    }

    /// Replace any matching rdataset with `replacement`, taking ownership
    /// of it rather than copying.
    pub fn replace_rdataset(&mut self, replacement: impl Into<Rdataset>) {
        let replacement = replacement.into();
        self.delete_rdataset(replacement.rdclass, replacement.rdtype, replacement.covers);
        self.append_rdataset(replacement);
    }

    /// A node holding a CNAME or RRSIG(CNAME) is a CNAME node.
    pub fn is_cname(&self) -> bool {
        self.rdatasets.iter().any(|rds| rds.implies_cname())
    }
}

// Set equality: the same rdatasets irrespective of insertion order.
impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        self.rdatasets
            .iter()
            .all(|rds| other.rdatasets.contains(rds))
            && other
                .rdatasets
                .iter()
                .all(|rds| self.rdatasets.contains(rds))
    }
}
