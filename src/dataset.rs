//! A `Dataset` is a typed, zone-bound collection answering lookups with a
//! classification value, a TTL and an optional TXT template. The source
//! this was modeled on dispatches on a dataset-type descriptor carrying
//! function pointers for load/query/dump; here that's a closed sum type
//! instead, since the set of dataset kinds is fixed (`ip4set`, `dnset`).
use std::net::Ipv4Addr;

use crate::dnset::DnSet;
use crate::ip4set::Ip4Set;
use crate::rfc1035::DomainName;

pub use crate::ip4set::Value;

pub const DEFAULT_TTL: u32 = 2048;

#[derive(Debug, Clone)]
pub enum DatasetKind {
    Ip4(Ip4Set),
    Dn(DnSet),
}

/// The subject extracted from a query name by stripping the zone origin:
/// either a decoded IPv4 address (reversed-octet RBL convention) or the
/// remaining domain for a `dnset` zone.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Ip4(u32),
    Dn(&'a DomainName<'a>),
}

/// Outcome of consulting one dataset for a subject.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    pub matched: bool,
    pub value: Value,
    pub ttl: u32,
    pub txt_template: Option<String>,
    /// the subject as extracted from the query name (the IP address in
    /// dotted-decimal, or the domain), for `$text` substitution in a TXT
    /// template — never the full query name, which still carries the zone
    /// origin.
    pub subject: String,
}

impl LookupResult {
    fn not_found() -> Self {
        LookupResult {
            matched: false,
            value: 0,
            ttl: DEFAULT_TTL,
            txt_template: None,
            subject: String::new(),
        }
    }
}

/// The subject's textual form, as substituted into a `$text` TXT template.
fn subject_text(subject: Subject<'_>) -> String {
    match subject {
        Subject::Ip4(addr) => Ipv4Addr::from(addr).to_string(),
        Subject::Dn(name) => name.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub kind: DatasetKind,
    pub ttl: u32,
    pub txt_template: Option<String>,
}

impl Dataset {
    pub fn new_ip4(ttl: u32, txt_template: Option<String>) -> Self {
        Dataset {
            kind: DatasetKind::Ip4(Ip4Set::new()),
            ttl,
            txt_template,
        }
    }

    pub fn new_dn(ttl: u32, txt_template: Option<String>) -> Self {
        Dataset {
            kind: DatasetKind::Dn(DnSet::new()),
            ttl,
            txt_template,
        }
    }

    pub fn finalize(&mut self) {
        match &mut self.kind {
            DatasetKind::Ip4(set) => set.finalize(),
            DatasetKind::Dn(set) => set.finalize(),
        }
    }

    /// Consults the dataset for `subject`, returning `not_found` if the
    /// subject's kind doesn't match this dataset's kind at all (e.g. an
    /// `dnset` zone queried with an ip4set-shaped subject).
    pub fn lookup(&self, subject: Subject<'_>) -> LookupResult {
        let (matched, value) = match (&self.kind, subject) {
            (DatasetKind::Ip4(set), Subject::Ip4(addr)) => set.lookup(addr),
            (DatasetKind::Dn(set), Subject::Dn(name)) => {
                let (matched, value, _exact) = set.lookup(name);
                (matched, value)
            }
            _ => return LookupResult::not_found(),
        };

        if !matched {
            return LookupResult::not_found();
        }

        LookupResult {
            matched: true,
            value,
            ttl: self.ttl,
            txt_template: self.txt_template.clone(),
            subject: subject_text(subject),
        }
    }

    pub fn is_ip4(&self) -> bool {
        matches!(self.kind, DatasetKind::Ip4(_))
    }

    pub fn is_dn(&self) -> bool {
        matches!(self.kind, DatasetKind::Dn(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip4set::Cidr;

    #[test]
    fn ip4_dataset_lookup_roundtrip() {
        let mut ds = Dataset::new_ip4(DEFAULT_TTL, Some("$text blocked".into()));
        if let DatasetKind::Ip4(set) = &mut ds.kind {
            set.add(Cidr::parse("10.0.0.0/8", false).unwrap(), 2);
        }
        ds.finalize();

        let result = ds.lookup(Subject::Ip4(u32::from(std::net::Ipv4Addr::new(10, 0, 0, 1))));
        assert!(result.matched);
        assert_eq!(result.value, 2);
        assert_eq!(result.ttl, DEFAULT_TTL);
        assert_eq!(result.subject, "10.0.0.1");
    }

    #[test]
    fn mismatched_subject_kind_is_not_found() {
        let mut ds = Dataset::new_ip4(DEFAULT_TTL, None);
        if let DatasetKind::Ip4(set) = &mut ds.kind {
            set.add(Cidr::parse("10.0.0.0/8", false).unwrap(), 2);
        }
        ds.finalize();

        let name = DomainName::try_from("x.example").unwrap();
        let result = ds.lookup(Subject::Dn(&name));
        assert!(!result.matched);
    }
}
