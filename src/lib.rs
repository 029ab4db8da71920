//! `rbldlib`: an authoritative UDP DNS server for publishing RBL/DNSBL
//! zones — in-memory IPv4-range and domain-name datasets, a restricted
//! RFC1035 wire codec, and a single-threaded reload/signal-driven event
//! loop. See the `eventloop` module for how the pieces are wired together.
#[macro_use]
pub mod macros;

pub mod config;
pub mod dataset;
pub mod dnset;
pub mod error;
pub mod eventloop;
pub mod ip4set;
pub mod loader;
pub mod netlist;
pub mod network_order;
#[cfg(unix)]
pub mod privdrop;
pub mod query;
pub mod rfc1035;
pub mod signals;
pub mod util;
pub mod zone;
