//! A dedicated error for all possible errors in the server: I/O, DNS packet
//! inconsistencies, configuration and zone-file problems.
use std::io;
use std::net::AddrParseError;
use std::str;

use crate::rfc1035::ResponseCode;

#[derive(Debug)]
pub enum DNSError {
    Io(io::Error),
    FromUtf8(std::string::FromUtf8Error),
    Utf8(str::Utf8Error),
    LoggerError(log::SetLoggerError),
    Addr(AddrParseError),
    /// bad command-line arguments
    Config(String),
    /// malformed zonespec or zone file
    Zone(String),
    /// a malformed wire packet, tagged with the RCODE that should be returned
    Protocol(ResponseCode, String),
    DNS(String),
    DNSInternalError(InternalError),
}

#[derive(Debug)]
pub enum InternalError {
    DnsDomainNameTooLong,
    EmptyDomainName,
}

impl DNSError {
    // Helper function to create a new DNS error from a string
    pub fn new(s: &str) -> Self {
        DNSError::DNS(String::from(s))
    }

    pub fn config<S: Into<String>>(s: S) -> Self {
        DNSError::Config(s.into())
    }

    pub fn zone<S: Into<String>>(s: S) -> Self {
        DNSError::Zone(s.into())
    }

    pub fn protocol<S: Into<String>>(rcode: ResponseCode, s: S) -> Self {
        DNSError::Protocol(rcode, s.into())
    }
}

impl std::fmt::Display for DNSError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DNSError::Io(e) => write!(f, "I/O error: {}", e),
            DNSError::FromUtf8(e) => write!(f, "UTF8 conversion error: {}", e),
            DNSError::Utf8(e) => write!(f, "UTF8 error: {}", e),
            DNSError::LoggerError(e) => write!(f, "logger error: {}", e),
            DNSError::Addr(e) => write!(f, "address parse error: {}", e),
            DNSError::Config(s) => write!(f, "configuration error: {}", s),
            DNSError::Zone(s) => write!(f, "zone error: {}", s),
            DNSError::Protocol(rcode, s) => write!(f, "protocol error ({:?}): {}", rcode, s),
            DNSError::DNS(s) => write!(f, "DNS error: {}", s),
            DNSError::DNSInternalError(e) => write!(f, "internal error: {:?}", e),
        }
    }
}

impl std::error::Error for DNSError {}

/// A specific custom `Result` for all functions
pub type DNSResult<T> = Result<T, DNSError>;

// All conversions for internal errors for DNSError
impl From<io::Error> for DNSError {
    fn from(err: io::Error) -> Self {
        DNSError::Io(err)
    }
}

impl From<String> for DNSError {
    fn from(err: String) -> Self {
        DNSError::DNS(err)
    }
}

impl From<std::string::FromUtf8Error> for DNSError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        DNSError::FromUtf8(err)
    }
}

impl From<str::Utf8Error> for DNSError {
    fn from(err: str::Utf8Error) -> Self {
        DNSError::Utf8(err)
    }
}

impl From<AddrParseError> for DNSError {
    fn from(err: AddrParseError) -> Self {
        DNSError::Addr(err)
    }
}

impl From<log::SetLoggerError> for DNSError {
    fn from(err: log::SetLoggerError) -> Self {
        DNSError::LoggerError(err)
    }
}
