//! Parses zonespecs (`origin:type:file[,file...]`) and zone files, and
//! drives mtime-triggered reloads. A reload always rebuilds a zone from
//! scratch from all of its backing files rather than attempting an
//! incremental update — RBL datasets are small enough that this stays
//! fast, and it keeps the swap-in atomic and simple (§4.4).
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use crate::dataset::{Dataset, DatasetKind, Value};
use crate::error::{DNSError, DNSResult};
use crate::ip4set::Cidr;
use crate::zone::{normalize_origin, Zone, ZoneRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetType {
    Ip4,
    Dn,
}

impl FromStr for DatasetType {
    type Err = DNSError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip4set" => Ok(DatasetType::Ip4),
            "dnset" => Ok(DatasetType::Dn),
            other => Err(DNSError::zone(format!("unknown dataset type: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZoneSpec {
    pub origin: String,
    pub dataset_type: DatasetType,
    pub files: Vec<PathBuf>,
}

/// Parses one `origin:type:file[,file...]` token from the command line.
pub fn parse_zonespec(s: &str) -> DNSResult<ZoneSpec> {
    let mut parts = s.splitn(3, ':');

    let origin = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DNSError::zone(format!("missing origin in zonespec: {}", s)))?;

    let dataset_type: DatasetType = parts
        .next()
        .ok_or_else(|| DNSError::zone(format!("missing dataset type in zonespec: {}", s)))?
        .parse()?;

    let files_part = parts
        .next()
        .ok_or_else(|| DNSError::zone(format!("missing file list in zonespec: {}", s)))?;

    let files: Vec<PathBuf> = files_part.split(',').map(PathBuf::from).collect();
    if files.is_empty() {
        return Err(DNSError::zone(format!("empty file list in zonespec: {}", s)));
    }

    Ok(ZoneSpec {
        origin: origin.to_string(),
        dataset_type,
        files,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Unchanged,
    ReloadedOk,
    ReloadedWithErrors,
}

pub struct Loader {
    pub specs: Vec<ZoneSpec>,
    pub accept_in_cidr: bool,
    pub default_ttl: u32,
}

impl Loader {
    pub fn new(specs: Vec<ZoneSpec>, accept_in_cidr: bool, default_ttl: u32) -> Self {
        Loader {
            specs,
            accept_in_cidr,
            default_ttl,
        }
    }

    /// Initial load: builds every zone named in `specs` from scratch. Any
    /// error here is fatal to the caller unless running with quickstart.
    pub fn build(&self) -> DNSResult<ZoneRegistry> {
        let mut registry = ZoneRegistry::new();

        for (origin, specs) in self.grouped_by_origin() {
            let zone = self.rebuild_zone(&origin, &specs)?;
            registry.insert(zone);
        }

        Ok(registry)
    }

    /// Rebuilds only the zones whose backing files changed since the last
    /// load, swapping each in atomically. A zone that fails to rebuild
    /// keeps its previous contents; the failure is logged, not propagated.
    pub fn reload(&self, registry: &mut ZoneRegistry) -> DNSResult<ReloadOutcome> {
        let mut changed = false;
        let mut had_errors = false;

        for (origin, specs) in self.grouped_by_origin() {
            let newest = newest_mtime(&specs)?;
            let origin_labels = normalize_origin(&origin);
            let current_mtime = registry.find_by_origin_mut(&origin_labels).map(|z| z.mtime);

            if current_mtime == Some(newest) {
                continue;
            }

            match self.rebuild_zone(&origin, &specs) {
                Ok(zone) => {
                    registry.replace(zone);
                    changed = true;
                }
                Err(e) => {
                    log::error!("zone {} failed to reload, keeping previous data: {}", origin, e);
                    had_errors = true;
                }
            }
        }

        Ok(if had_errors {
            ReloadOutcome::ReloadedWithErrors
        } else if changed {
            ReloadOutcome::ReloadedOk
        } else {
            ReloadOutcome::Unchanged
        })
    }

    fn grouped_by_origin(&self) -> Vec<(String, Vec<&ZoneSpec>)> {
        let mut groups: Vec<(String, Vec<&ZoneSpec>)> = Vec::new();
        for spec in &self.specs {
            match groups.iter_mut().find(|(origin, _)| origin == &spec.origin) {
                Some((_, v)) => v.push(spec),
                None => groups.push((spec.origin.clone(), vec![spec])),
            }
        }
        groups
    }

    fn rebuild_zone(&self, origin: &str, specs: &[&ZoneSpec]) -> DNSResult<Zone> {
        let mut zone = Zone::new(origin, self.default_ttl);
        let mut mtime = SystemTime::UNIX_EPOCH;

        for spec in specs {
            let mut dataset = match spec.dataset_type {
                DatasetType::Ip4 => Dataset::new_ip4(zone.ttl, None),
                DatasetType::Dn => Dataset::new_dn(zone.ttl, None),
            };

            let mut default_value: Value = 2;
            for file in &spec.files {
                let meta = fs::metadata(file)?;
                let file_mtime = meta.modified()?;
                if file_mtime > mtime {
                    mtime = file_mtime;
                }
                load_zone_file(file, &mut zone, &mut dataset, &mut default_value, self.accept_in_cidr)?;
            }

            dataset.finalize();
            zone.datasets.push(dataset);
        }

        zone.mtime = mtime;
        Ok(zone)
    }
}

fn newest_mtime(specs: &[&ZoneSpec]) -> DNSResult<SystemTime> {
    let mut newest = SystemTime::UNIX_EPOCH;
    for spec in specs {
        for file in &spec.files {
            let modified = fs::metadata(file)?.modified()?;
            if modified > newest {
                newest = modified;
            }
        }
    }
    Ok(newest)
}

/// Reads one zone file into `dataset`, which must already be of the right
/// kind for entry lines to land in (directives may still retarget `zone`'s
/// SOA/NS/TTL, and `$DATASET` may push and switch to an additional dataset).
fn load_zone_file(
    path: &Path,
    zone: &mut Zone,
    dataset: &mut Dataset,
    default_value: &mut Value,
    accept_in_cidr: bool,
) -> DNSResult<()> {
    let content = fs::read_to_string(path)
        .map_err(|e| DNSError::zone(format!("{}: {}", path.display(), e)))?;

    for (lineno, raw_line) in content.lines().enumerate() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let result = if let Some(rest) = line.strip_prefix('$') {
            apply_directive(rest, zone, dataset, default_value)
        } else {
            apply_entry(line, dataset, *default_value, accept_in_cidr)
        };

        result.map_err(|e| {
            DNSError::zone(format!("{}:{}: {}", path.display(), lineno + 1, e))
        })?;
    }

    Ok(())
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn apply_entry(
    line: &str,
    dataset: &mut Dataset,
    default_value: Value,
    accept_in_cidr: bool,
) -> DNSResult<()> {
    let mut tokens = line.split_whitespace();
    let subject = tokens
        .next()
        .ok_or_else(|| DNSError::zone("empty entry line"))?;

    let value = match tokens.next() {
        // the value field carries a leading `:`, e.g. `10.0.0.0/8 :2`
        Some(v) => v
            .trim_start_matches(':')
            .parse::<Value>()
            .map_err(|_| DNSError::zone(format!("bad classification value: {}", v)))?,
        None => default_value,
    };

    match &mut dataset.kind {
        DatasetKind::Ip4(set) => {
            let cidr = Cidr::parse(subject, accept_in_cidr)?;
            set.add(cidr, value);
        }
        DatasetKind::Dn(set) => {
            set.add(subject, value);
        }
    }

    Ok(())
}

/// `$TTL n`, `$SOA mname rname [serial refresh retry expire minimum]`,
/// `$NS name`, `$DATASET type name`, `$A ip` (sets the default
/// classification value to the last octet of `ip`), `$TXT "text"`.
fn apply_directive(
    rest: &str,
    zone: &mut Zone,
    dataset: &mut Dataset,
    default_value: &mut Value,
) -> DNSResult<()> {
    let mut tokens = rest.split_whitespace();
    let keyword = tokens.next().unwrap_or("");

    match keyword {
        "TTL" => {
            let ttl: u32 = tokens
                .next()
                .ok_or_else(|| DNSError::zone("$TTL needs a value"))?
                .parse()
                .map_err(|_| DNSError::zone("$TTL value must be a number"))?;
            zone.ttl = ttl;
            dataset.ttl = ttl;
        }
        "SOA" => {
            zone.soa.mname = tokens
                .next()
                .ok_or_else(|| DNSError::zone("$SOA needs an mname"))?
                .to_string();
            zone.soa.rname = tokens
                .next()
                .ok_or_else(|| DNSError::zone("$SOA needs an rname"))?
                .to_string();

            if let Some(serial) = tokens.next() {
                zone.soa.serial = serial
                    .parse()
                    .map_err(|_| DNSError::zone("$SOA serial must be a number"))?;
            }
            if let Some(refresh) = tokens.next() {
                zone.soa.refresh = refresh
                    .parse()
                    .map_err(|_| DNSError::zone("$SOA refresh must be a number"))?;
            }
            if let Some(retry) = tokens.next() {
                zone.soa.retry = retry
                    .parse()
                    .map_err(|_| DNSError::zone("$SOA retry must be a number"))?;
            }
            if let Some(expire) = tokens.next() {
                zone.soa.expire = expire
                    .parse()
                    .map_err(|_| DNSError::zone("$SOA expire must be a number"))?;
            }
            if let Some(minimum) = tokens.next() {
                zone.soa.minimum = minimum
                    .parse()
                    .map_err(|_| DNSError::zone("$SOA minimum must be a number"))?;
            }
        }
        "NS" => {
            let name = tokens
                .next()
                .ok_or_else(|| DNSError::zone("$NS needs a name"))?;
            zone.ns.push(name.to_string());
        }
        "DATASET" => {
            // sanity-checks that the file agrees with the type the zonespec
            // bound this dataset to; the name token is informational only
            let type_str = tokens
                .next()
                .ok_or_else(|| DNSError::zone("$DATASET needs a type"))?;
            let declared: DatasetType = type_str.parse()?;
            let actual = match dataset.kind {
                DatasetKind::Ip4(_) => DatasetType::Ip4,
                DatasetKind::Dn(_) => DatasetType::Dn,
            };
            if declared != actual {
                return Err(DNSError::zone(format!(
                    "$DATASET {} doesn't match the file's zonespec-declared type",
                    type_str
                )));
            }
        }
        "A" => {
            let ip: Ipv4Addr = tokens
                .next()
                .ok_or_else(|| DNSError::zone("$A needs an address"))?
                .parse()
                .map_err(|_| DNSError::zone("$A value must be an IPv4 address"))?;
            *default_value = ip.octets()[3] as Value;
        }
        "TXT" => {
            let text = rest[keyword.len()..].trim().trim_matches('"');
            dataset.txt_template = Some(text.to_string());
        }
        other => {
            return Err(DNSError::zone(format!("unknown directive: ${}", other)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_zonespec_with_multiple_files() {
        let spec = parse_zonespec("sbl.example:ip4set:a.zone,b.zone").unwrap();
        assert_eq!(spec.origin, "sbl.example");
        assert_eq!(spec.dataset_type, DatasetType::Ip4);
        assert_eq!(spec.files, vec![PathBuf::from("a.zone"), PathBuf::from("b.zone")]);
    }

    #[test]
    fn rejects_unknown_dataset_type() {
        assert!(parse_zonespec("sbl.example:weird:a.zone").is_err());
    }

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("rbld-test-{}-{}", std::process::id(), name));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn builds_ip4_zone_from_file() {
        let path = write_temp("ip4.zone", "# comment\n10.0.0.0/8 :2\n");
        let loader = Loader::new(
            vec![ZoneSpec {
                origin: "sbl.example".to_string(),
                dataset_type: DatasetType::Ip4,
                files: vec![path.clone()],
            }],
            false,
            2048,
        );

        let registry = loader.build().unwrap();
        assert_eq!(registry.len(), 1);
        let zone = &registry.zones()[0];
        assert_eq!(zone.origin, vec!["sbl", "example"]);
        fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_bad_entry_lines() {
        let path = write_temp("bad.zone", "not-an-ip\n");
        let loader = Loader::new(
            vec![ZoneSpec {
                origin: "sbl.example".to_string(),
                dataset_type: DatasetType::Ip4,
                files: vec![path.clone()],
            }],
            false,
            2048,
        );

        assert!(loader.build().is_err());
        fs::remove_file(path).ok();
    }

    #[test]
    fn reload_is_unchanged_when_mtime_is_stable() {
        let path = write_temp("stable.zone", "10.0.0.0/8 :2\n");
        let loader = Loader::new(
            vec![ZoneSpec {
                origin: "sbl.example".to_string(),
                dataset_type: DatasetType::Ip4,
                files: vec![path.clone()],
            }],
            false,
            2048,
        );

        let mut registry = loader.build().unwrap();
        let outcome = loader.reload(&mut registry).unwrap();
        assert_eq!(outcome, ReloadOutcome::Unchanged);
        fs::remove_file(path).ok();
    }
}
