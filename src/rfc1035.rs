//! Base structures for DNS messages. See RFC1035: https://datatracker.ietf.org/doc/html/rfc1035
//!
//! The `DnsStruct` procedural macro automatically defines the implementation of the
//! `ToFromNetworkOrder` trait for composite structures.
//! The `DnsEnum` procedural macro automatically implements `Default`, `FromStr`,
//! `TryFrom<u8>` and `TryFrom<u16>` for C-like discriminant enums.
use std::fmt;

use crate::error::{DNSError, DNSResult, InternalError};
use crate::network_order::ToFromNetworkOrder;

use dns_derive::{DnsEnum, DnsStruct};

pub const MAX_DNS_PACKET_SIZE: usize = 512;

// DNS packet header: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
#[derive(Debug, Default, Clone, DnsStruct)]
pub struct DNSPacketHeader {
    pub id: u16, // A 16 bit identifier assigned by the program that
    //   generates any kind of query.  This identifier is copied
    //   the corresponding reply and can be used by the requester
    //   to match up replies to outstanding queries.
    pub flags: DNSPacketFlags,
    pub qd_count: u16, // number of entries in the question section
    pub an_count: u16, // number of RRs in the answer section
    pub ns_count: u16, // number of RRs in the authority records section
    pub ar_count: u16, // number of RRs in the additional records section
}

// Flags: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1, Z/AD/CD split per RFC4035
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DNSPacketFlags {
    pub packet_type: PacketType, // whether this message is a query (0) or a response (1)
    pub op_code: OpCode,         // kind of query in this message
    pub is_authorative_answer: bool, // responding server is an authority for the qname
    pub is_truncated: bool,          // message was truncated due to length
    pub is_recursion_desired: bool,  // may be set in a query, copied into the response
    pub is_recursion_available: bool, // whether recursive query support is available
    pub z: bool,                     // reserved, must be zero
    pub authentic_data: bool,        // DNSSEC: data has been verified per local policy
    pub checking_disabled: bool,     // DNSSEC: non-verified data is acceptable
    pub response_code: ResponseCode, // RCODE
}

/// The flags' first bit is 0 or 1 meaning a question or a response. Better is to use an enum which is
/// both clearer and type oriented.
#[derive(Debug, Clone, Copy, PartialEq, DnsEnum)]
#[repr(u8)]
pub enum PacketType {
    Query = 0,
    Response = 1,
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PacketType::Query => write!(f, "QUERY"),
            PacketType::Response => write!(f, "RESPONSE"),
        }
    }
}

// op codes: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-5
#[derive(Debug, Clone, Copy, PartialEq, DnsEnum)]
#[repr(u8)]
pub enum OpCode {
    Query = 0,
    IQuery = 1,
    Status = 2,
    Unassigned = 3,
    Notify = 4,
    Update = 5,
    DSO = 6,
}

// response codes: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-6
#[derive(Debug, Clone, Copy, PartialEq, DnsEnum)]
#[repr(u16)]
pub enum ResponseCode {
    NoError = 0,
    FormErr = 1,
    ServFail = 2,
    NXDomain = 3,
    NotImp = 4,
    Refused = 5,
    YXDomain = 6,
    YXRRSet = 7,
    NXRRSet = 8,
    NotAuth = 9,
    NotZone = 10,
    DSOTYPENI = 11,
    BADVERS = 16,
    BADKEY = 17,
    BADTIME = 18,
    BADMODE = 19,
    BADNAME = 20,
    BADALG = 21,
    BADTRUNC = 22,
    BADCOOKIE = 23,
}

// RR type codes: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-4
// Only the subset a blocklist zone ever needs to emit or compare against is kept.
#[derive(Debug, Copy, Clone, PartialEq, DnsEnum)]
#[repr(u16)]
pub enum QType {
    A = 1,
    NS = 2,
    CNAME = 5,
    SOA = 6,
    PTR = 12,
    MX = 15,
    TXT = 16,
    AAAA = 28,
    ANY = 255,
}

// RR Class values: https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.4
#[derive(Debug, Copy, Clone, PartialEq, DnsEnum)]
#[repr(u16)]
pub enum QClass {
    IN = 1,
    CH = 3, // CHAOS, used for e.g. version.bind queries
    ANY = 255,
}

// Character string: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.4
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CharacterString<'a>(pub &'a str);

/// ```
/// use rbldlib::rfc1035::CharacterString;
///
/// let cs = CharacterString("www");
/// assert_eq!(cs.to_string(), "www");
/// ```
impl<'a> fmt::Display for CharacterString<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'a> From<&'a str> for CharacterString<'a> {
    fn from(s: &'a str) -> Self {
        CharacterString(s)
    }
}

/// A domain name as a sequence of labels, stored left-to-right (`www.example.com`
/// is `["www", "example", "com"]`), without a trailing root label. Used both to
/// decode query names off the wire and to build names for responses.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DomainName<'a>(pub Vec<&'a str>);

impl<'a> DomainName<'a> {
    /// Appends the labels found in `slice`, which must be a standard
    /// length-prefixed label sequence terminated by a zero-length label.
    pub fn from_slice(&mut self, slice: &'a [u8]) -> DNSResult<()> {
        let mut index = 0usize;

        while index < slice.len() {
            let size = slice[index] as usize;
            if size == 0 {
                break;
            }

            if crate::util::is_pointer(slice[index]) {
                return Err(DNSError::new(
                    "unexpected compression pointer in domain name slice",
                ));
            }

            if index + 1 + size > slice.len() {
                return Err(DNSError::DNSInternalError(
                    InternalError::DnsDomainNameTooLong,
                ));
            }

            let label = std::str::from_utf8(&slice[index + 1..index + 1 + size])?;
            self.0.push(label);
            index += size + 1;
        }

        Ok(())
    }

    /// Number of labels, not counting the implicit root.
    pub fn label_count(&self) -> usize {
        self.0.len()
    }

    /// `true` if `self` is `other` or a strict sub-domain of `other`.
    pub fn is_subdomain_of(&self, other: &DomainName<'_>) -> bool {
        if other.0.len() > self.0.len() {
            return false;
        }
        let offset = self.0.len() - other.0.len();
        self.0[offset..]
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

/// ```
/// use rbldlib::rfc1035::DomainName;
///
/// let dn = DomainName::try_from("www.google.com").unwrap();
/// assert_eq!(dn.to_string(), "www.google.com");
///
/// let dn = DomainName::try_from(".").unwrap();
/// assert_eq!(dn.to_string(), "");
/// ```
impl<'a> fmt::Display for DomainName<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// ```
/// use rbldlib::rfc1035::DomainName;
///
/// let dn = DomainName::try_from("www.example.com").unwrap();
/// assert_eq!(dn.0, &["www", "example", "com"]);
///
/// let dn = DomainName::try_from(".").unwrap();
/// assert!(dn.0.is_empty());
///
/// assert!(DomainName::try_from("").is_err());
/// ```
impl<'a> TryFrom<&'a str> for DomainName<'a> {
    type Error = DNSError;

    fn try_from(domain: &'a str) -> Result<Self, Self::Error> {
        if domain.is_empty() {
            return Err(DNSError::DNSInternalError(InternalError::EmptyDomainName));
        }

        if domain == "." {
            return Ok(DomainName(Vec::new()));
        }

        let labels: Vec<_> = domain.split('.').filter(|x| !x.is_empty()).collect();
        Ok(DomainName(labels))
    }
}

//--------------------------------------------------------------------------------
// Question structure: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.2
//--------------------------------------------------------------------------------
#[derive(Debug, Default, Clone, DnsStruct)]
pub struct DNSQuestion<'a> {
    pub name: DomainName<'a>,
    pub r#type: QType,
    pub class: QClass,
}

impl<'a> DNSQuestion<'a> {
    /// Create a new question. By default, the IN class is used if None is provided
    /// as the qclass parameter.
    pub fn new(domain: &'a str, qtype: QType, qclass: Option<QClass>) -> DNSResult<Self> {
        let dn = DomainName::try_from(domain)?;
        Ok(DNSQuestion {
            name: dn,
            r#type: qtype,
            class: qclass.unwrap_or(QClass::IN),
        })
    }
}

/// A full DNS message: a header plus a payload whose shape depends on
/// what's being encoded (a single question when building a query, an
/// answer section when building a response). `ToFromNetworkOrder` is
/// implemented manually in `network_order::dns` since `T` isn't a lifetime
/// parameter and the `DnsStruct` derive only looks for those.
#[derive(Debug, Default, Clone)]
pub struct DNSPacket<T> {
    pub header: DNSPacketHeader,
    pub data: T,
}

//------------------------------------------------------------------------
// Definition of a resource record in RFC1035
//------------------------------------------------------------------------
// rd_data holds the already-encoded RDATA (built by whichever RR-specific
// struct below produced it); this sidesteps needing a `Box<dyn ToFromNetworkOrder>`
// field, which cannot itself implement the codec trait.
#[derive(Debug, Default, Clone)]
pub struct DNSResourceRecord<'a> {
    pub name: DomainName<'a>,
    pub r#type: QType,
    pub class: QClass,
    pub ttl: u32,
    pub rd_length: u16,
    pub rd_data: Vec<u8>,
}

impl<'a> ToFromNetworkOrder<'a> for DNSResourceRecord<'a> {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
        let mut length = self.name.to_network_bytes(buffer)?;
        length += self.r#type.to_network_bytes(buffer)?;
        length += self.class.to_network_bytes(buffer)?;
        length += self.ttl.to_network_bytes(buffer)?;
        length += self.rd_length.to_network_bytes(buffer)?;
        buffer.extend_from_slice(&self.rd_data);
        length += self.rd_data.len();
        Ok(length)
    }

    fn from_network_bytes(
        &mut self,
        buffer: &mut std::io::Cursor<&'a [u8]>,
    ) -> DNSResult<()> {
        self.name.from_network_bytes(buffer)?;
        self.r#type.from_network_bytes(buffer)?;
        self.class.from_network_bytes(buffer)?;
        self.ttl.from_network_bytes(buffer)?;
        self.rd_length.from_network_bytes(buffer)?;

        let position = buffer.position() as usize;
        let end = position + self.rd_length as usize;
        self.rd_data = buffer.get_ref()[position..end].to_vec();
        buffer.set_position(end as u64);
        Ok(())
    }
}

//------------------------------------------------------------------------
// RR-specific RDATA structures, encoded to bytes and placed in rd_data
//------------------------------------------------------------------------

// A RR
pub type A = u32;

// CNAME RR
pub type CNAME<'a> = DomainName<'a>;

// NS RR
pub type NS<'a> = DomainName<'a>;

// AAAA RR
pub type AAAA = [u8; 16];

// SOA RR: https://datatracker.ietf.org/doc/html/rfc1035#section-3.3.13
#[derive(Debug, Default, Clone, DnsStruct)]
pub struct SOA<'a> {
    pub mname: DomainName<'a>, // primary name server for the zone
    pub rname: DomainName<'a>, // mailbox of the zone's administrator
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32, // minimum TTL exported with any RR from this zone
}

// MX RR
#[derive(Debug, Default, Clone, DnsStruct)]
pub struct MX<'a> {
    pub preference: u16,
    pub exchange: DomainName<'a>,
}

// TXT RR
pub type TXT<'a> = CharacterString<'a>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_name_subdomain() {
        let zone = DomainName::try_from("sbl.example").unwrap();
        let query = DomainName::try_from("1.0.0.10.sbl.example").unwrap();
        assert!(query.is_subdomain_of(&zone));

        let other = DomainName::try_from("notsbl.example").unwrap();
        assert!(!query.is_subdomain_of(&other));
    }

    #[test]
    fn domain_name_roundtrip_via_slice() {
        let bytes = [3, b'w', b'w', b'w', 3, b'c', b'o', b'm', 0];
        let mut dn = DomainName::default();
        dn.from_slice(&bytes).unwrap();
        assert_eq!(dn.0, &["www", "com"]);
    }

    #[test]
    fn packet_type_display() {
        assert_eq!(PacketType::Query.to_string(), "QUERY");
        assert_eq!(PacketType::Response.to_string(), "RESPONSE");
    }

    #[test]
    fn resource_record_roundtrip() {
        let rr = DNSResourceRecord {
            name: DomainName::try_from("sbl.example").unwrap(),
            r#type: QType::A,
            class: QClass::IN,
            ttl: 2048,
            rd_length: 4,
            rd_data: vec![127, 0, 0, 2],
        };

        let mut buffer = Vec::new();
        let length = rr.to_network_bytes(&mut buffer).unwrap();
        assert_eq!(length, buffer.len());

        let mut cursor = std::io::Cursor::new(buffer.as_slice());
        let mut decoded = DNSResourceRecord::default();
        decoded.from_network_bytes(&mut cursor).unwrap();
        assert_eq!(decoded.rd_data, vec![127, 0, 0, 2]);
        assert_eq!(decoded.ttl, 2048);
    }
}
