//! The single-threaded cooperative event loop (§4.6/§5): bind, then
//! alternate between servicing one UDP packet and draining the
//! signal-pending mask. A blocking `recv_from` with a read timeout stands
//! in for the original's `alarm(2)`-driven `SIGALRM`/`EINTR` dance — the
//! idiomatic Rust shape for "wake up periodically even with no traffic" is
//! a timeout on the blocking call, not a real-time signal (§5, §9.4).
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::{SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::error::DNSResult;
use crate::loader::{Loader, ReloadOutcome};
use crate::query::{build_error_response, build_response, dispatch, parse_query, ParseOutcome};
use crate::rfc1035::ResponseCode;
use crate::signals::{self, SignalState};
use crate::zone::ZoneRegistry;

/// The interval the loop wakes up at even with no traffic, so the pending
/// signal mask and the mtime-poll deadline both get checked promptly.
const POLL_TICK: Duration = Duration::from_millis(500);

/// Counters dumped by SIGUSR1/USR2 (§5); USR2 additionally resets them.
/// Plain `u64`s, not atomics: only the single loop thread ever touches
/// these, same as every other piece of server state.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub received: u64,
    pub answered: u64,
    pub nxdomain: u64,
    pub refused: u64,
    pub formerr: u64,
    pub notimp: u64,
    pub dropped: u64,
    pub reloads: u64,
}

impl Stats {
    fn dump(&self) {
        info!(
            "stats: received={} answered={} nxdomain={} refused={} formerr={} notimp={} dropped={} reloads={}",
            self.received,
            self.answered,
            self.nxdomain,
            self.refused,
            self.formerr,
            self.notimp,
            self.dropped,
            self.reloads,
        );
    }
}

/// The query-log writer (`-l`/`-L`): a plain buffered file, not routed
/// through the `log` facade, since §6 treats it as a distinct artifact
/// from the diagnostic log (§9.4).
struct QueryLog {
    file: File,
    flush_every_line: bool,
}

impl QueryLog {
    fn open(path: &std::path::Path, flush_every_line: bool) -> DNSResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(QueryLog {
            file,
            flush_every_line,
        })
    }

    fn log(&mut self, source: SocketAddrV4, qname: &str, qtype: &str, rcode: ResponseCode) {
        let _ = writeln!(
            self.file,
            "{} {} {} {:?}",
            source.ip(),
            qname,
            qtype,
            rcode
        );
        if self.flush_every_line {
            let _ = self.file.flush();
        }
    }
}

/// Owns everything the loop needs across iterations: the socket, the zone
/// registry (replaced wholesale on reload), the loader that knows how to
/// rebuild it, the signal mask, and the query log/stats.
pub struct EventLoop {
    socket: UdpSocket,
    registry: ZoneRegistry,
    loader: Loader,
    signals: SignalState,
    config: RunConfig,
    query_log: Option<QueryLog>,
    stats: Stats,
}

impl EventLoop {
    /// Takes an already-bound socket rather than binding one itself: the
    /// bind has to happen while the process still holds whatever
    /// privilege `-b`'s port requires, which in `main` is before chroot
    /// and privilege drop — both of which happen between construction
    /// time and here.
    pub fn new(config: RunConfig, loader: Loader, registry: ZoneRegistry, socket: UdpSocket) -> DNSResult<Self> {
        socket.set_read_timeout(Some(POLL_TICK))?;

        let signals = SignalState::install()?;

        let query_log = match &config.query_log {
            Some(spec) => Some(QueryLog::open(&spec.path, spec.flush_every_line)?),
            None => None,
        };

        Ok(EventLoop {
            socket,
            registry,
            loader,
            signals,
            config,
            query_log,
            stats: Stats::default(),
        })
    }

    /// Runs until SIGTERM/SIGINT is observed, then flushes stats and
    /// returns. The mtime-poll deadline is re-armed every `recheck`
    /// regardless of traffic, per §5's "alarm fires every recheck seconds".
    pub fn run(&mut self) -> DNSResult<()> {
        let mut next_recheck = Instant::now() + self.config.recheck;
        let mut buf = [0u8; 512];

        loop {
            let pending = self.signals.drain();

            if pending & signals::SHUTDOWN != 0 {
                info!("shutdown requested, flushing stats and exiting");
                self.stats.dump();
                return Ok(());
            }

            if pending & signals::RELOAD != 0 {
                self.reload("SIGHUP");
                next_recheck = Instant::now() + self.config.recheck;
            }

            if pending & (signals::STATS_DUMP | signals::STATS_RESET) != 0 {
                self.stats.dump();
                if pending & signals::STATS_RESET != 0 {
                    self.stats = Stats::default();
                }
            }

            if Instant::now() >= next_recheck {
                self.reload("recheck timer");
                next_recheck = Instant::now() + self.config.recheck;
            }

            match self.socket.recv_from(&mut buf) {
                Ok((len, peer)) => {
                    self.stats.received += 1;
                    self.service_packet(&buf[..len], peer);
                }
                Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                    // timeout: spin back to the signal/recheck checks above
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                    // EINTR: spin back, same as a timeout (§5)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn reload(&mut self, trigger: &str) {
        debug!("reload triggered by {}", trigger);
        match self.loader.reload(&mut self.registry) {
            Ok(ReloadOutcome::Unchanged) => {}
            Ok(ReloadOutcome::ReloadedOk) => {
                self.stats.reloads += 1;
                if self.config.verbose {
                    info!("zones reloaded ({} zones)", self.registry.len());
                }
            }
            Ok(ReloadOutcome::ReloadedWithErrors) => {
                self.stats.reloads += 1;
                warn!("zone reload completed with errors; affected zones kept prior data");
            }
            Err(e) => error!("reload failed: {}", e),
        }
    }

    fn service_packet(&mut self, buf: &[u8], peer: std::net::SocketAddr) {
        let peer_v4 = match peer {
            std::net::SocketAddr::V4(v4) => v4,
            std::net::SocketAddr::V6(_) => return, // UDP socket is bound v4-only; unreachable in practice
        };

        if !self.config.answer_filter.matches(*peer_v4.ip()) {
            self.stats.dropped += 1;
            return;
        }

        let (response, qname, qtype, rcode) = match parse_query(buf) {
            ParseOutcome::Query(query) => {
                let (rcode, answers, authority) = dispatch(&query, &self.registry);
                let question = crate::rfc1035::DNSQuestion {
                    name: query.qname.clone(),
                    r#type: query.qtype,
                    class: query.qclass,
                };

                match rcode {
                    ResponseCode::NXDomain => self.stats.nxdomain += 1,
                    ResponseCode::Refused => self.stats.refused += 1,
                    ResponseCode::NoError => self.stats.answered += 1,
                    _ => {}
                }

                let body = build_response(
                    query.id,
                    query.recursion_desired,
                    &question,
                    rcode,
                    &answers,
                    authority.as_ref(),
                );
                (body, query.qname.to_string(), format!("{:?}", query.qtype), rcode)
            }
            ParseOutcome::Error {
                id,
                recursion_desired,
                question,
                rcode,
            } => {
                match rcode {
                    ResponseCode::FormErr => self.stats.formerr += 1,
                    ResponseCode::NotImp => self.stats.notimp += 1,
                    _ => {}
                }
                let qname = question
                    .as_ref()
                    .map(|q| q.name.to_string())
                    .unwrap_or_default();
                let qtype = question
                    .as_ref()
                    .map(|q| format!("{:?}", q.r#type))
                    .unwrap_or_default();
                let body = build_error_response(id, recursion_desired, question.as_ref(), rcode);
                (body, qname, qtype, rcode)
            }
            ParseOutcome::Drop => {
                self.stats.dropped += 1;
                return;
            }
        };

        if let Some(log) = &mut self.query_log {
            if self.config.log_filter.matches(*peer_v4.ip()) {
                log.log(peer_v4, &qname, &qtype, rcode);
            }
        }

        match response {
            Ok(bytes) => self.send_reliably(&bytes, peer),
            Err(e) => error!("failed to build response for {}: {}", peer, e),
        }
    }

    /// Retries `sendto` on `EINTR` until a non-interrupted result, per §7's
    /// "transient I/O retries until a non-EINTR error or success".
    fn send_reliably(&self, bytes: &[u8], peer: std::net::SocketAddr) {
        loop {
            match self.socket.send_to(bytes, peer) {
                Ok(_) => return,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("sendto {} failed: {}", peer, e);
                    return;
                }
            }
        }
    }
}

/// Binds the UDP socket and sizes its receive buffer to the largest value
/// the kernel accepts, trying from 64 KiB down by 3% per attempt (§5), so
/// packets arriving during a reload queue in the kernel rather than being
/// dropped by the (single-threaded, momentarily busy) application.
pub fn bind_socket(addr: SocketAddrV4) -> DNSResult<UdpSocket> {
    let socket = UdpSocket::bind(addr)?;
    size_recv_buffer(&socket);
    Ok(socket)
}

#[cfg(unix)]
fn size_recv_buffer(socket: &UdpSocket) {
    use std::os::unix::io::AsRawFd;

    let fd = socket.as_raw_fd();
    let mut size: u32 = 64 * 1024;

    while size > 4096 {
        // SAFETY: setsockopt on a valid fd we own, with a correctly-sized
        // and correctly-typed option value.
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &size as *const u32 as *const libc::c_void,
                std::mem::size_of::<u32>() as libc::socklen_t,
            )
        };
        if ret == 0 {
            debug!("socket receive buffer sized to {} bytes", size);
            return;
        }
        size = (size as f64 * 0.97) as u32;
    }
    warn!("could not grow socket receive buffer beyond the kernel default");
}

#[cfg(not(unix))]
fn size_recv_buffer(_socket: &UdpSocket) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_default_is_all_zero() {
        let stats = Stats::default();
        assert_eq!(stats.received, 0);
        assert_eq!(stats.answered, 0);
    }
}
