//! In-memory store of non-overlapping IPv4 CIDR ranges, each carrying a
//! classification value. See RFC1035 zone files for the kind of flat text
//! this is built from; the store itself is just a sorted, merged interval
//! set with binary-search lookup.
use std::net::Ipv4Addr;

use crate::error::{DNSError, DNSResult};

/// Value `0` means "not listed"; any other value selects a synthesized
/// A/TXT pair (see `crate::query`).
pub type Value = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range {
    start: u32,
    end: u32, // inclusive
    value: Value,
}

/// A CIDR or range, as parsed off a zone-file line, before it's folded
/// into the sorted store by `finalize()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub start: u32,
    pub end: u32, // inclusive
}

impl Cidr {
    /// Parses `a.b.c.d`, `a.b.c`, `a.b`, `a` (zero-filled to 32 bits) with an
    /// optional `/bits` suffix, or an `a-b` range of two such addresses.
    ///
    /// `accept_in_cidr` controls what happens when the base address of a
    /// `/bits` form has host bits set: `false` rejects it, `true` clears
    /// them silently.
    pub fn parse(s: &str, accept_in_cidr: bool) -> DNSResult<Self> {
        let s = s.trim();

        if let Some((lo, hi)) = s.split_once('-') {
            let start = parse_dotted(lo.trim())?;
            let end = parse_dotted(hi.trim())?;
            if start > end {
                return Err(DNSError::zone(format!("range {} has start > end", s)));
            }
            return Ok(Cidr { start, end });
        }

        let (addr_part, bits) = match s.split_once('/') {
            Some((a, b)) => {
                let bits: u32 = b
                    .parse()
                    .map_err(|_| DNSError::zone(format!("bad prefix length in {}", s)))?;
                if !(1..=32).contains(&bits) {
                    return Err(DNSError::zone(format!("prefix length out of range: {}", s)));
                }
                (a, bits)
            }
            None => (s, 32),
        };

        let base = parse_dotted(addr_part)?;
        let mask = if bits == 32 { u32::MAX } else { !(u32::MAX >> bits) };

        if base & !mask != 0 {
            if !accept_in_cidr {
                return Err(DNSError::zone(format!(
                    "{} has host bits set (use -e to allow)",
                    s
                )));
            }
        }

        let network = base & mask;
        let broadcast = network | !mask;
        Ok(Cidr {
            start: network,
            end: broadcast,
        })
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr <= self.end
    }
}

/// Parses dot-notation with implicit zero-fill: `10` -> `10.0.0.0`, `10.1` ->
/// `10.1.0.0`, etc.
fn parse_dotted(s: &str) -> DNSResult<u32> {
    let mut octets = [0u8; 4];
    let parts: Vec<&str> = s.split('.').collect();

    if parts.is_empty() || parts.len() > 4 {
        return Err(DNSError::zone(format!("malformed address: {}", s)));
    }

    for (i, part) in parts.iter().enumerate() {
        octets[i] = part
            .parse::<u8>()
            .map_err(|_| DNSError::zone(format!("malformed address: {}", s)))?;
    }

    Ok(u32::from_be_bytes(octets))
}

/// A finalized, non-overlapping, sorted set of IPv4 ranges.
#[derive(Debug, Default, Clone)]
pub struct Ip4Set {
    pending: Vec<Range>,
    ranges: Vec<Range>,
    finalized: bool,
}

impl Ip4Set {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a range to the load-time buffer. Call `finalize()` once all
    /// entries are added.
    pub fn add(&mut self, cidr: Cidr, value: Value) {
        self.pending.push(Range {
            start: cidr.start,
            end: cidr.end,
            value,
        });
        self.finalized = false;
    }

    /// Sorts by start, then sweeps to resolve overlaps: a later-inserted
    /// range wins over an earlier one across their common span, and the
    /// earlier range is split around it. Adjacent ranges sharing a value
    /// are coalesced.
    pub fn finalize(&mut self) {
        // stable sort: for equal starts, later add() calls (appended later
        // in `pending`) sort after earlier ones and so win ties below.
        let mut indexed: Vec<(usize, Range)> =
            self.pending.iter().copied().enumerate().collect();
        indexed.sort_by_key(|(idx, r)| (r.start, *idx));

        let mut resolved: Vec<Range> = Vec::with_capacity(indexed.len());

        for (_, incoming) in indexed {
            insert_resolving_overlaps(&mut resolved, incoming);
        }

        resolved.sort_by_key(|r| r.start);
        coalesce(&mut resolved);

        self.ranges = resolved;
        self.pending.clear();
        self.finalized = true;
    }

    /// Binary search for the greatest `start <= addr`; the entry's value
    /// applies iff `addr <= end`.
    pub fn lookup(&self, addr: u32) -> (bool, Value) {
        debug_assert!(self.finalized, "Ip4Set::lookup called before finalize()");

        match self.ranges.partition_point(|r| r.start <= addr) {
            0 => (false, 0),
            idx => {
                let r = &self.ranges[idx - 1];
                if addr <= r.end {
                    (true, r.value)
                } else {
                    (false, 0)
                }
            }
        }
    }

    pub fn lookup_addr(&self, addr: Ipv4Addr) -> (bool, Value) {
        self.lookup(u32::from(addr))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Inserts `incoming`, splitting/truncating any already-resolved range it
/// overlaps so that `incoming`'s value wins across the overlap. `resolved`
/// is not required to stay sorted between calls; it's re-sorted once in
/// `finalize()` after the sweep.
fn insert_resolving_overlaps(resolved: &mut Vec<Range>, incoming: Range) {
    let mut survivors = Vec::with_capacity(resolved.len() + 1);

    for existing in resolved.drain(..) {
        if existing.end < incoming.start || existing.start > incoming.end {
            survivors.push(existing);
            continue;
        }

        // existing overlaps incoming; keep the slivers of existing that
        // fall outside incoming's span.
        if existing.start < incoming.start {
            survivors.push(Range {
                start: existing.start,
                end: incoming.start - 1,
                value: existing.value,
            });
        }
        if existing.end > incoming.end {
            survivors.push(Range {
                start: incoming.end + 1,
                end: existing.end,
                value: existing.value,
            });
        }
    }

    survivors.push(incoming);
    *resolved = survivors;
}

fn coalesce(ranges: &mut Vec<Range>) {
    let mut out: Vec<Range> = Vec::with_capacity(ranges.len());
    for r in ranges.drain(..) {
        match out.last_mut() {
            Some(prev) if prev.value == r.value && prev.end + 1 == r.start => {
                prev.end = r.end;
            }
            _ => out.push(r),
        }
    }
    *ranges = out;
}
