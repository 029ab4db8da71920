//! A zone is a named subtree of the DNS namespace served authoritatively:
//! an origin, the datasets bound under it, an SOA/NS pair, and the
//! composite mtime of the files it was built from. The registry picks the
//! zone whose origin is the longest suffix of a query name.
use std::time::SystemTime;

use crate::dataset::{Dataset, DatasetKind, LookupResult, Subject};
use crate::rfc1035::DomainName;

#[derive(Debug, Clone)]
pub struct ZoneSoa {
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl Default for ZoneSoa {
    fn default() -> Self {
        ZoneSoa {
            mname: String::new(),
            rname: String::new(),
            serial: 1,
            refresh: 3600,
            retry: 600,
            expire: 86400,
            minimum: crate::dataset::DEFAULT_TTL,
        }
    }
}

/// Outcome of dispatching an in-zone query name against a zone's datasets.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneLookup {
    /// the subject isn't listed in any bound dataset: NXDOMAIN
    NotListed,
    /// the subject is listed: NOERROR with the synthesized records below
    Listed(LookupResult),
}

#[derive(Debug, Clone)]
pub struct Zone {
    /// lowercase labels, left-to-right, e.g. `sbl.example` -> `["sbl", "example"]`
    pub origin: Vec<String>,
    pub datasets: Vec<Dataset>,
    pub soa: ZoneSoa,
    pub ns: Vec<String>,
    pub ttl: u32,
    pub mtime: SystemTime,
}

impl Zone {
    pub fn new(origin: &str, ttl: u32) -> Self {
        Zone {
            origin: normalize_origin(origin),
            datasets: Vec::new(),
            soa: ZoneSoa::default(),
            ns: Vec::new(),
            ttl,
            mtime: SystemTime::UNIX_EPOCH,
        }
    }

    pub fn origin_len(&self) -> usize {
        self.origin.len()
    }

    /// If `name` ends in this zone's origin, returns the remaining
    /// (leading) labels — the subject.
    pub fn strip_origin<'a>(&self, name: &DomainName<'a>) -> Option<Vec<&'a str>> {
        if name.0.len() < self.origin.len() {
            return None;
        }

        let split = name.0.len() - self.origin.len();
        let (subject, suffix) = name.0.split_at(split);

        if suffix
            .iter()
            .zip(self.origin.iter())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
        {
            Some(subject.to_vec())
        } else {
            None
        }
    }

    /// Consults this zone's datasets in order for `name`, which must
    /// already have been confirmed to belong to this zone by the caller
    /// (normally `ZoneRegistry::find`). Returns `None` only if `name`
    /// doesn't actually fall under this zone's origin.
    pub fn lookup(&self, name: &DomainName<'_>) -> Option<ZoneLookup> {
        let subject_labels = self.strip_origin(name)?;

        for dataset in &self.datasets {
            let result = match &dataset.kind {
                DatasetKind::Ip4(_) => match decode_ip4_subject(&subject_labels) {
                    Some(addr) => dataset.lookup(Subject::Ip4(addr)),
                    None => continue,
                },
                DatasetKind::Dn(_) => {
                    let subject_name = DomainName(subject_labels.clone());
                    dataset.lookup(Subject::Dn(&subject_name))
                }
            };

            if result.matched {
                return Some(ZoneLookup::Listed(result));
            }
        }

        Some(ZoneLookup::NotListed)
    }
}

/// Splits a dotted origin into lowercase labels, left-to-right; `.` and the
/// empty string both normalize to the root zone (no labels).
pub fn normalize_origin(origin: &str) -> Vec<String> {
    if origin == "." || origin.is_empty() {
        Vec::new()
    } else {
        origin
            .split('.')
            .filter(|l| !l.is_empty())
            .map(|l| l.to_ascii_lowercase())
            .collect()
    }
}

/// Decodes a 4-label subject in the RBL reversed-octet convention: the
/// name's labels, left-to-right, are the IP's octets in reverse order
/// (mirroring `in-addr.arpa`). `1.0.0.10` decodes to `10.0.0.1`.
fn decode_ip4_subject(labels: &[&str]) -> Option<u32> {
    if labels.len() != 4 {
        return None;
    }

    let mut octets = [0u8; 4];
    for (i, label) in labels.iter().enumerate() {
        octets[i] = label.parse::<u8>().ok()?;
    }
    octets.reverse();
    Some(u32::from_be_bytes(octets))
}

/// Zones ordered by non-increasing origin length, so a linear scan finds
/// the longest-suffix match first. Cardinality is expected to stay small
/// (a handful to a few dozen zones), so this beats a trie in simplicity.
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, zone: Zone) {
        let pos = self
            .zones
            .partition_point(|z| z.origin_len() >= zone.origin_len());
        self.zones.insert(pos, zone);
    }

    /// The zone whose origin is the longest suffix of `name`, if any.
    pub fn find(&self, name: &DomainName<'_>) -> Option<&Zone> {
        self.zones.iter().find(|z| z.strip_origin(name).is_some())
    }

    pub fn find_by_origin_mut(&mut self, origin: &[String]) -> Option<&mut Zone> {
        self.zones.iter_mut().find(|z| z.origin == origin)
    }

    /// Atomically swaps in a freshly-built zone, replacing any existing
    /// zone with the same origin. The old zone is dropped only once the
    /// new one is in place.
    pub fn replace(&mut self, zone: Zone) {
        self.zones.retain(|z| z.origin != zone.origin);
        self.insert(zone);
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DEFAULT_TTL;
    use crate::ip4set::Cidr;

    fn dn(s: &str) -> DomainName<'_> {
        DomainName::try_from(s).unwrap()
    }

    fn ip4_zone() -> Zone {
        let mut zone = Zone::new("sbl.example", DEFAULT_TTL);
        let mut dataset = Dataset::new_ip4(DEFAULT_TTL, None);
        if let DatasetKind::Ip4(set) = &mut dataset.kind {
            set.add(Cidr::parse("10.0.0.0/8", false).unwrap(), 2);
        }
        dataset.finalize();
        zone.datasets.push(dataset);
        zone
    }

    #[test]
    fn listed_subject_yields_classification() {
        let zone = ip4_zone();
        let lookup = zone.lookup(&dn("1.0.0.10.sbl.example")).unwrap();
        assert_eq!(
            lookup,
            ZoneLookup::Listed(LookupResult {
                matched: true,
                value: 2,
                ttl: DEFAULT_TTL,
                txt_template: None,
                subject: "10.0.0.1".to_string(),
            })
        );
    }

    #[test]
    fn unlisted_subject_in_zone_is_not_listed() {
        let zone = ip4_zone();
        let lookup = zone.lookup(&dn("1.0.0.11.sbl.example")).unwrap();
        assert_eq!(lookup, ZoneLookup::NotListed);
    }

    #[test]
    fn name_outside_zone_yields_none() {
        let zone = ip4_zone();
        assert!(zone.lookup(&dn("example.com")).is_none());
    }

    #[test]
    fn registry_picks_longest_suffix() {
        let mut registry = ZoneRegistry::new();
        registry.insert(Zone::new("example", DEFAULT_TTL));
        registry.insert(ip4_zone());

        let found = registry.find(&dn("1.0.0.10.sbl.example")).unwrap();
        assert_eq!(found.origin, vec!["sbl", "example"]);
    }

    #[test]
    fn registry_refuses_names_outside_any_zone() {
        let mut registry = ZoneRegistry::new();
        registry.insert(ip4_zone());

        assert!(registry.find(&dn("other.test")).is_none());
    }
}
