//! In-memory store of domain-name suffixes, each carrying a classification
//! value and an exact/wildcard flag. Entries are kept sorted over their
//! reversed-label representation so a suffix match becomes a binary search
//! plus a prefix check.
use crate::ip4set::Value;
use crate::rfc1035::DomainName;

#[derive(Debug, Clone)]
struct Entry {
    /// reversed labels, e.g. `bad.example` -> `["example", "bad"]`
    reversed: Vec<String>,
    wildcard: bool,
    value: Value,
}

/// A finalized, sorted domain-name suffix store.
#[derive(Debug, Default, Clone)]
pub struct DnSet {
    pending: Vec<Entry>,
    entries: Vec<Entry>,
    finalized: bool,
}

impl DnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry. A leading `.` on `name` marks it as a wildcard
    /// (matches any strict sub-domain); its absence makes the entry exact.
    pub fn add(&mut self, name: &str, value: Value) {
        let (wildcard, stripped) = match name.strip_prefix('.') {
            Some(rest) => (true, rest),
            None => (false, name),
        };

        let mut reversed: Vec<String> = stripped
            .split('.')
            .filter(|l| !l.is_empty())
            .map(|l| l.to_ascii_lowercase())
            .collect();
        reversed.reverse();

        self.pending.push(Entry {
            reversed,
            wildcard,
            value,
        });
        self.finalized = false;
    }

    /// Sorts entries lexicographically by reversed labels; later-added
    /// duplicates of the same key win (later file order overrides earlier).
    pub fn finalize(&mut self) {
        let mut indexed: Vec<(usize, Entry)> =
            self.pending.drain(..).enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| a.reversed.cmp(&b.reversed).then(ia.cmp(ib)));

        let mut entries: Vec<Entry> = Vec::with_capacity(indexed.len());
        for (_, entry) in indexed {
            if let Some(last) = entries.last_mut() {
                if last.reversed == entry.reversed {
                    *last = entry;
                    continue;
                }
            }
            entries.push(entry);
        }

        self.entries = entries;
        self.finalized = true;
    }

    /// `(found, value, is_exact_match)`. Binary search for the greatest
    /// entry whose reversed labels are <= the query's; that entry matches
    /// iff it equals the query (exact) or is a label-boundary prefix of it
    /// and is flagged wildcard.
    pub fn lookup(&self, name: &DomainName<'_>) -> (bool, Value, bool) {
        debug_assert!(self.finalized, "DnSet::lookup called before finalize()");

        let mut reversed: Vec<String> = name.0.iter().map(|l| l.to_ascii_lowercase()).collect();
        reversed.reverse();

        let idx = self
            .entries
            .partition_point(|e| e.reversed <= reversed);
        if idx == 0 {
            return (false, 0, false);
        }

        let candidate = &self.entries[idx - 1];

        if candidate.reversed == reversed {
            return (true, candidate.value, true);
        }

        if candidate.wildcard
            && candidate.reversed.len() < reversed.len()
            && reversed[..candidate.reversed.len()] == candidate.reversed[..]
        {
            return (true, candidate.value, false);
        }

        (false, 0, false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> DomainName<'_> {
        DomainName::try_from(s).unwrap()
    }

    #[test]
    fn exact_entry_matches_only_itself() {
        let mut set = DnSet::new();
        set.add("bad.example", 3);
        set.finalize();

        assert_eq!(set.lookup(&dn("bad.example")), (true, 3, true));
        assert_eq!(set.lookup(&dn("x.bad.example")), (false, 0, false));
    }

    #[test]
    fn wildcard_entry_matches_subdomains_not_itself_boundary() {
        let mut set = DnSet::new();
        set.add(".bad.example", 3);
        set.finalize();

        assert_eq!(set.lookup(&dn("x.y.bad.example")), (true, 3, false));
        assert_eq!(set.lookup(&dn("bad.example")), (false, 0, false));
    }

    #[test]
    fn later_add_wins_on_identical_key() {
        let mut set = DnSet::new();
        set.add("bad.example", 1);
        set.add("bad.example", 9);
        set.finalize();

        assert_eq!(set.lookup(&dn("bad.example")), (true, 9, true));
    }

    #[test]
    fn no_match_for_unrelated_domain() {
        let mut set = DnSet::new();
        set.add(".bad.example", 3);
        set.finalize();

        assert_eq!(set.lookup(&dn("good.example")), (false, 0, false));
    }
}
