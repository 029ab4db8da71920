//! A netlist is an ordered, first-match-wins list of CIDR or hostname
//! rules, each optionally negated with `!` for deny. Used both for the
//! query-log filter (`-L`) and the answer filter (`-a`). A hostname token
//! names a fixed host given at startup, not something that needs a
//! per-packet reverse lookup, so it's forward-resolved once here, at
//! parse time, into the CIDR(s) it names.
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

use crate::error::{DNSError, DNSResult};
use crate::ip4set::Cidr;

#[derive(Debug, Clone)]
struct Rule {
    cidr: Cidr,
    allow: bool,
}

#[derive(Debug, Clone)]
pub struct Netlist {
    rules: Vec<Rule>,
    /// the inverse of the last explicit rule's polarity; an empty netlist
    /// admits everything
    default_allow: bool,
}

impl Netlist {
    /// Splits on commas, semicolons and whitespace. A `!` prefix on a
    /// token marks it as a deny rule; everything else on that token is
    /// tried as a CIDR first, falling back to one-shot forward DNS
    /// resolution of a literal hostname into its IPv4 address(es).
    pub fn parse(s: &str) -> DNSResult<Self> {
        let mut rules = Vec::new();
        let mut last_allow = true;

        for token in s
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let (allow, rest) = match token.strip_prefix('!') {
                Some(rest) => (false, rest),
                None => (true, token),
            };
            last_allow = allow;

            match Cidr::parse(rest, true) {
                Ok(cidr) => rules.push(Rule { cidr, allow }),
                Err(_) => {
                    for addr in resolve_host(rest)? {
                        let addr_u32 = u32::from(addr);
                        rules.push(Rule {
                            cidr: Cidr {
                                start: addr_u32,
                                end: addr_u32,
                            },
                            allow,
                        });
                    }
                }
            }
        }

        let default_allow = if rules.is_empty() { true } else { !last_allow };

        Ok(Netlist {
            rules,
            default_allow,
        })
    }

    /// `true` if `addr` is admitted by the first rule it matches, or by
    /// the implicit terminal rule if none match.
    pub fn matches(&self, addr: Ipv4Addr) -> bool {
        let addr_u32 = u32::from(addr);

        for rule in &self.rules {
            if rule.cidr.contains(addr_u32) {
                return rule.allow;
            }
        }

        self.default_allow
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Resolves `host` to its IPv4 address(es) via the system resolver, once,
/// at parse time. `(host, 0)` rather than a bare `host:0` string, since
/// `host` itself may not parse as a `SocketAddr`.
fn resolve_host(host: &str) -> DNSResult<Vec<Ipv4Addr>> {
    let addrs: Vec<Ipv4Addr> = (host, 0u16)
        .to_socket_addrs()
        .map_err(|e| DNSError::config(format!("netlist entry '{}' is neither a CIDR nor a resolvable host: {}", host, e)))?
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .collect();

    if addrs.is_empty() {
        return Err(DNSError::config(format!(
            "netlist entry '{}' resolved to no IPv4 addresses",
            host
        )));
    }

    Ok(addrs)
}

impl Default for Netlist {
    /// An absent `-a`/`-L` option admits everything.
    fn default() -> Self {
        Netlist {
            rules: Vec::new(),
            default_allow: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_netlist_admits_everything() {
        let nl = Netlist::default();
        assert!(nl.matches(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[test]
    fn allow_rule_admits_matching_cidr() {
        let nl = Netlist::parse("127.0.0.0/8").unwrap();
        assert!(nl.matches(Ipv4Addr::new(127, 0, 0, 1)));
        assert!(!nl.matches(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn deny_only_netlist_implicitly_admits_the_rest() {
        let nl = Netlist::parse("!10.0.0.0/8").unwrap();
        assert!(!nl.matches(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(nl.matches(Ipv4Addr::new(192, 168, 0, 1)));
    }

    #[test]
    fn first_match_wins() {
        let nl = Netlist::parse("!10.0.0.1/32,10.0.0.0/8").unwrap();
        assert!(!nl.matches(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(nl.matches(Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[test]
    fn hostname_rule_resolves_to_a_cidr_at_parse_time() {
        // "localhost" resolves via /etc/hosts with no network access, to
        // 127.0.0.1 (and possibly ::1, filtered out since this netlist is
        // IPv4-only).
        let nl = Netlist::parse("!localhost").unwrap();
        assert!(!nl.is_empty());
        assert!(!nl.matches(Ipv4Addr::new(127, 0, 0, 1)));
        assert!(nl.matches(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn unresolvable_hostname_is_rejected_at_parse_time() {
        let err = Netlist::parse("this.host.does.not.resolve.invalid").unwrap_err();
        assert!(matches!(err, crate::error::DNSError::Config(_)));
    }
}
