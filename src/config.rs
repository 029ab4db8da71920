//! Command-line parsing (§6) into an immutable `RunConfig`, built once at
//! startup and threaded explicitly through the loader and event loop
//! rather than exposed as mutable globals (§9.3/§10).
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;

use clap::{App, Arg};

use crate::error::{DNSError, DNSResult};
use crate::loader::{parse_zonespec, ZoneSpec};
use crate::netlist::Netlist;

pub const DEFAULT_PORT: u16 = 53;
pub const DEFAULT_TTL: u32 = 2048;
pub const DEFAULT_RECHECK_SECS: u64 = 60;

/// `user[:group]`, as given to `-u`. Resolution to uids/gids happens in
/// `privdrop`, not here — this module only splits the syntax.
#[derive(Debug, Clone)]
pub struct UserSpec {
    pub user: String,
    pub group: Option<String>,
}

impl std::str::FromStr for UserSpec {
    type Err = DNSError;

    fn from_str(s: &str) -> DNSResult<Self> {
        match s.split_once(':') {
            Some((user, group)) => Ok(UserSpec {
                user: user.to_string(),
                group: Some(group.to_string()),
            }),
            None => Ok(UserSpec {
                user: s.to_string(),
                group: None,
            }),
        }
    }
}

/// The query log's destination and flush policy (`-l [+]logfile`).
#[derive(Debug, Clone)]
pub struct QueryLogSpec {
    pub path: PathBuf,
    pub flush_every_line: bool,
}

/// Every parsed CLI option (§6), immutable after startup.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub user: Option<UserSpec>,
    pub chroot_dir: Option<PathBuf>,
    pub workdir: Option<PathBuf>,
    pub bind_addr: SocketAddrV4,
    pub ttl: u32,
    pub recheck: std::time::Duration,
    pub accept_in_cidr: bool,
    pub pidfile: Option<PathBuf>,
    pub foreground: bool,
    pub quickstart: bool,
    pub query_log: Option<QueryLogSpec>,
    pub log_filter: Netlist,
    pub answer_filter: Netlist,
    pub verbose: bool,
    pub zonespecs: Vec<ZoneSpec>,
}

/// Parses `[addr][:port]`, e.g. `*:53`, `127.0.0.1`, `:5353`. `*` and an
/// absent host both mean "any address"; an absent port defaults to 53.
fn parse_bind_addr(s: &str) -> DNSResult<SocketAddrV4> {
    let (host, port) = match s.rsplit_once(':') {
        Some((h, p)) => (h, p.parse::<u16>().map_err(|_| {
            DNSError::config(format!("bad port in bind address: {}", s))
        })?),
        None => (s, DEFAULT_PORT),
    };

    let addr = if host.is_empty() || host == "*" {
        Ipv4Addr::UNSPECIFIED
    } else {
        host.parse()
            .map_err(|_| DNSError::config(format!("bad bind address: {}", s)))?
    };

    Ok(SocketAddrV4::new(addr, port))
}

impl RunConfig {
    /// Parses `progname [options] zonespec...` from the process's actual
    /// `argv`. A bad-argument error here is the caller's cue to print to
    /// stderr and exit 1, per §7.
    pub fn from_args() -> DNSResult<Self> {
        Self::from_args_iter(std::env::args())
    }

    pub fn from_args_iter<I, T>(args: I) -> DNSResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = App::new("rbld")
            .version("0.1")
            .about("Authoritative UDP DNS server for RBL/DNSBL zones")
            .arg(Arg::new("user").short('u').takes_value(true).long_help("user[:group] to drop privileges to"))
            .arg(Arg::new("root").short('r').takes_value(true).long_help("chroot to this directory"))
            .arg(Arg::new("workdir").short('w').takes_value(true).long_help("chdir here after chroot"))
            .arg(Arg::new("bind").short('b').takes_value(true).long_help("[addr][:port] to bind, default *:53"))
            .arg(Arg::new("ttl").short('t').takes_value(true).long_help("default TTL, default 2048"))
            .arg(Arg::new("check").short('c').takes_value(true).long_help("mtime poll interval in seconds, default 60"))
            .arg(Arg::new("accept-in-cidr").short('e').takes_value(false).long_help("permit non-boundary CIDRs"))
            .arg(Arg::new("pidfile").short('p').takes_value(true).long_help("write PID to this file"))
            .arg(Arg::new("foreground").short('n').takes_value(false).long_help("stay in the foreground"))
            .arg(Arg::new("quickstart").short('q').takes_value(false).long_help("load zones after fork"))
            .arg(Arg::new("logfile").short('l').takes_value(true).long_help("query log file, '+' prefix flushes each line"))
            .arg(Arg::new("log-netlist").short('L').takes_value(true).long_help("restrict which source IPs are logged"))
            .arg(Arg::new("answer-netlist").short('a').takes_value(true).long_help("restrict which source IPs get answered"))
            .arg(Arg::new("verbose").short('s').takes_value(false).long_help("verbose reload/memory stats"))
            .arg(Arg::new("zonespec").multiple_values(true).required(true))
            .try_get_matches_from(args)
            .map_err(|e| DNSError::config(e.to_string()))?;

        let user = matches
            .value_of("user")
            .map(|s| s.parse())
            .transpose()?;

        let bind_addr = match matches.value_of("bind") {
            Some(s) => parse_bind_addr(s)?,
            None => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT),
        };

        let ttl = match matches.value_of("ttl") {
            Some(s) => s
                .parse()
                .map_err(|_| DNSError::config(format!("bad TTL: {}", s)))?,
            None => DEFAULT_TTL,
        };

        let recheck = match matches.value_of("check") {
            Some(s) => {
                let secs: u64 = s
                    .parse()
                    .map_err(|_| DNSError::config(format!("bad check interval: {}", s)))?;
                std::time::Duration::from_secs(secs)
            }
            None => std::time::Duration::from_secs(DEFAULT_RECHECK_SECS),
        };

        let query_log = matches.value_of("logfile").map(|s| match s.strip_prefix('+') {
            Some(path) => QueryLogSpec {
                path: PathBuf::from(path),
                flush_every_line: true,
            },
            None => QueryLogSpec {
                path: PathBuf::from(s),
                flush_every_line: false,
            },
        });

        let log_filter = matches
            .value_of("log-netlist")
            .map(Netlist::parse)
            .transpose()?
            .unwrap_or_default();

        let answer_filter = matches
            .value_of("answer-netlist")
            .map(Netlist::parse)
            .transpose()?
            .unwrap_or_default();

        let zonespecs: Vec<ZoneSpec> = matches
            .values_of("zonespec")
            .expect("zonespec is required")
            .map(parse_zonespec)
            .collect::<DNSResult<Vec<_>>>()?;

        Ok(RunConfig {
            user,
            chroot_dir: matches.value_of("root").map(PathBuf::from),
            workdir: matches.value_of("workdir").map(PathBuf::from),
            bind_addr,
            ttl,
            recheck,
            accept_in_cidr: matches.is_present("accept-in-cidr"),
            pidfile: matches.value_of("pidfile").map(PathBuf::from),
            foreground: matches.is_present("foreground"),
            quickstart: matches.is_present("quickstart"),
            query_log,
            log_filter,
            answer_filter,
            verbose: matches.is_present("verbose"),
            zonespecs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &[&str]) -> Vec<String> {
        std::iter::once("rbld".to_string())
            .chain(s.iter().map(|s| s.to_string()))
            .collect()
    }

    #[test]
    fn parses_defaults() {
        let cfg = RunConfig::from_args_iter(args(&["sbl.example:ip4set:sbl.zone"])).unwrap();
        assert_eq!(cfg.ttl, DEFAULT_TTL);
        assert_eq!(cfg.bind_addr.port(), DEFAULT_PORT);
        assert!(!cfg.accept_in_cidr);
        assert_eq!(cfg.zonespecs.len(), 1);
    }

    #[test]
    fn parses_bind_with_star_and_port() {
        let cfg = RunConfig::from_args_iter(args(&[
            "-b",
            "*:5353",
            "sbl.example:ip4set:sbl.zone",
        ]))
        .unwrap();
        assert_eq!(cfg.bind_addr.ip(), &Ipv4Addr::UNSPECIFIED);
        assert_eq!(cfg.bind_addr.port(), 5353);
    }

    #[test]
    fn parses_user_and_group() {
        let cfg = RunConfig::from_args_iter(args(&[
            "-u",
            "nobody:nogroup",
            "sbl.example:ip4set:sbl.zone",
        ]))
        .unwrap();
        let user = cfg.user.unwrap();
        assert_eq!(user.user, "nobody");
        assert_eq!(user.group.as_deref(), Some("nogroup"));
    }

    #[test]
    fn requires_at_least_one_zonespec() {
        assert!(RunConfig::from_args_iter(args(&[])).is_err());
    }

    #[test]
    fn query_log_flush_prefix() {
        let cfg = RunConfig::from_args_iter(args(&[
            "-l",
            "+/var/log/rbld.log",
            "sbl.example:ip4set:sbl.zone",
        ]))
        .unwrap();
        let log = cfg.query_log.unwrap();
        assert!(log.flush_every_line);
        assert_eq!(log.path, PathBuf::from("/var/log/rbld.log"));
    }
}
