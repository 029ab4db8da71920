//! Parses an incoming UDP DNS query, dispatches it against the zone
//! registry, and builds the wire-format response. The three steps are
//! kept as free functions over owned/borrowed data rather than a single
//! `DNSMessage` object, since request and response have different
//! shapes (one question in, a variable answer set out) and the
//! compression trick used when building (point the RR owner name back at
//! the question) doesn't fit a single round-trippable struct anyway.
use std::io::Cursor;
use std::net::Ipv4Addr;

use crate::error::DNSResult;
use crate::network_order::ToFromNetworkOrder;
use crate::rfc1035::{
    DNSPacketFlags, DNSPacketHeader, DNSQuestion, DomainName, OpCode, PacketType, QClass, QType,
    ResponseCode, MAX_DNS_PACKET_SIZE, SOA,
};
use crate::zone::{Zone, ZoneLookup, ZoneRegistry};

const HEADER_SIZE: usize = 12;
const MAX_LABEL_LENGTH: usize = 63;
const MAX_NAME_LENGTH: usize = 255;

/// A pointer back to the question's QNAME, which always starts right
/// after the fixed 12-byte header.
const COMPRESSION_POINTER_TO_QUESTION: [u8; 2] = [0xC0, 0x0C];

/// A successfully parsed, single-question query ready for dispatch.
#[derive(Debug)]
pub struct ParsedQuery<'a> {
    pub id: u16,
    pub recursion_desired: bool,
    pub qname: DomainName<'a>,
    pub qtype: QType,
    pub qclass: QClass,
}

/// What came off the wire: a query to dispatch, a malformed-but-partially
/// recoverable packet (respond with an error RCODE), or something with no
/// recoverable header at all (drop, per §7: never respond to unparseable
/// garbage without even a trustworthy id/flags).
#[derive(Debug)]
pub enum ParseOutcome<'a> {
    Query(ParsedQuery<'a>),
    Error {
        id: u16,
        recursion_desired: bool,
        question: Option<DNSQuestion<'a>>,
        rcode: ResponseCode,
    },
    Drop,
}

/// Scans the raw label sequence starting at `start` for a compression
/// pointer byte, without following it. Stops at the first zero-length
/// (terminating) label or once it runs off the end of `buf`, in which case
/// the normal question parse below will fail on its own and report FORMERR.
fn question_name_has_pointer(buf: &[u8], start: usize) -> bool {
    let mut idx = start;
    while idx < buf.len() {
        let len = buf[idx];
        if crate::util::is_pointer(len) {
            return true;
        }
        if len == 0 {
            return false;
        }
        idx += 1 + len as usize;
    }
    false
}

/// `parse(buf, len) → query | FORMERR | NOTIMP | REFUSED` per the codec
/// contract; REFUSED is a dispatch-time outcome (no zone matches), not a
/// parse-time one, so it's produced later in `dispatch`.
pub fn parse_query(buf: &[u8]) -> ParseOutcome<'_> {
    if buf.len() < HEADER_SIZE {
        return ParseOutcome::Drop;
    }

    let mut cursor = Cursor::new(buf);
    let mut header = DNSPacketHeader::default();
    if header.from_network_bytes(&mut cursor).is_err() {
        return ParseOutcome::Drop;
    }

    let id = header.id;
    let recursion_desired = header.flags.is_recursion_desired;

    // §4.5: "no compression pointers in the query" — reject outright rather
    // than silently follow one, since a query name has no preceding message
    // to point into in the first place.
    if question_name_has_pointer(buf, HEADER_SIZE) {
        return ParseOutcome::Error {
            id,
            recursion_desired,
            question: None,
            rcode: ResponseCode::FormErr,
        };
    }

    let mut question = DNSQuestion::default();
    let question_ok = question.from_network_bytes(&mut cursor).is_ok();

    if header.flags.op_code != OpCode::Query {
        return ParseOutcome::Error {
            id,
            recursion_desired,
            question: if question_ok { Some(question) } else { None },
            rcode: ResponseCode::NotImp,
        };
    }

    let counts_ok = header.qd_count == 1
        && header.an_count == 0
        && header.ns_count == 0
        && header.ar_count == 0;

    if !counts_ok || !question_ok {
        return ParseOutcome::Error {
            id,
            recursion_desired,
            question: if question_ok { Some(question) } else { None },
            rcode: ResponseCode::FormErr,
        };
    }

    if !matches!(question.class, QClass::IN | QClass::ANY | QClass::CH) {
        return ParseOutcome::Error {
            id,
            recursion_desired,
            question: Some(question),
            rcode: ResponseCode::FormErr,
        };
    }

    let total_len: usize = question.name.0.iter().map(|l| l.len() + 1).sum::<usize>() + 1;
    let label_too_long = question.name.0.iter().any(|l| l.len() > MAX_LABEL_LENGTH);

    if label_too_long || total_len > MAX_NAME_LENGTH {
        return ParseOutcome::Error {
            id,
            recursion_desired,
            question: Some(question),
            rcode: ResponseCode::FormErr,
        };
    }

    ParseOutcome::Query(ParsedQuery {
        id,
        recursion_desired,
        qname: question.name,
        qtype: question.r#type,
        qclass: question.class,
    })
}

/// A ready-to-encode RR: owner name is always the compression pointer
/// back to the question, class is always IN.
#[derive(Debug, Clone)]
pub struct SynthesizedAnswer {
    pub rtype: QType,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

/// A ready-to-encode authority-section SOA record. Unlike an answer, its
/// owner is the zone origin rather than the question name, so it can't
/// point back at the question with a compression pointer and carries its
/// name in full.
#[derive(Debug, Clone)]
pub struct SynthesizedAuthority {
    pub owner: Vec<u8>,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

/// Builds the authority-section SOA record for `zone`, or `None` if the
/// zone file never set `$SOA` (an unconfigured `mname` means no SOA was
/// declared).
fn soa_authority(zone: &Zone) -> Option<SynthesizedAuthority> {
    if zone.soa.mname.is_empty() {
        return None;
    }

    let origin_refs: Vec<&str> = zone.origin.iter().map(String::as_str).collect();
    let mut owner = Vec::new();
    DomainName(origin_refs).to_network_bytes(&mut owner).ok()?;

    let soa = SOA {
        mname: DomainName::try_from(zone.soa.mname.as_str()).ok()?,
        rname: DomainName::try_from(zone.soa.rname.as_str()).ok()?,
        serial: zone.soa.serial,
        refresh: zone.soa.refresh,
        retry: zone.soa.retry,
        expire: zone.soa.expire,
        minimum: zone.soa.minimum,
    };

    let mut rdata = Vec::new();
    soa.to_network_bytes(&mut rdata).ok()?;

    Some(SynthesizedAuthority {
        owner,
        ttl: zone.soa.minimum,
        rdata,
    })
}

/// Matches `query` against the zone registry and produces the response
/// code, any synthesized answer records, and an authority-section SOA
/// record for NXDOMAIN, per §4.5's response-code table: REFUSED (no
/// zone), NXDOMAIN (in-zone, not listed), NOERROR with zero answers
/// (in-zone, listed, but not for the requested qtype), or NOERROR with
/// answers.
pub fn dispatch(
    query: &ParsedQuery<'_>,
    registry: &ZoneRegistry,
) -> (ResponseCode, Vec<SynthesizedAnswer>, Option<SynthesizedAuthority>) {
    let zone = match registry.find(&query.qname) {
        Some(zone) => zone,
        None => return (ResponseCode::Refused, Vec::new(), None),
    };

    let listed = match zone.lookup(&query.qname) {
        Some(ZoneLookup::Listed(result)) => result,
        Some(ZoneLookup::NotListed) => {
            return (ResponseCode::NXDomain, Vec::new(), soa_authority(zone));
        }
        None => return (ResponseCode::Refused, Vec::new(), None),
    };

    if !matches!(query.qtype, QType::A | QType::TXT | QType::ANY) {
        return (ResponseCode::NoError, Vec::new(), None);
    }

    let mut answers = Vec::new();

    if matches!(query.qtype, QType::A | QType::ANY) {
        let last_octet = listed.value.min(u8::MAX as u32) as u8;
        let ip = Ipv4Addr::new(127, 0, 0, last_octet);
        answers.push(SynthesizedAnswer {
            rtype: QType::A,
            ttl: listed.ttl,
            rdata: ip.octets().to_vec(),
        });
    }

    if matches!(query.qtype, QType::TXT | QType::ANY) {
        if let Some(template) = &listed.txt_template {
            let text = template.replace("$text", &listed.subject);
            let mut rdata = Vec::with_capacity(text.len() + 1);
            rdata.push(text.len().min(u8::MAX as usize) as u8);
            rdata.extend_from_slice(&text.as_bytes()[..rdata[0] as usize]);
            answers.push(SynthesizedAnswer {
                rtype: QType::TXT,
                ttl: listed.ttl,
                rdata,
            });
        }
    }

    (ResponseCode::NoError, answers, None)
}

/// Builds a response in a fresh buffer: header, the question echoed back
/// verbatim, then each answer with its owner name compressed to point at
/// the question, then an optional authority-section SOA record. If the
/// record set wouldn't fit in 512 bytes, only whole RRs are kept (answers
/// before authority) and TC is set.
pub fn build_response(
    id: u16,
    recursion_desired: bool,
    question: &DNSQuestion<'_>,
    rcode: ResponseCode,
    answers: &[SynthesizedAnswer],
    authority: Option<&SynthesizedAuthority>,
) -> DNSResult<Vec<u8>> {
    let mut body = Vec::new();
    question.to_network_bytes(&mut body)?;

    let mut an_count: u16 = 0;
    let mut ns_count: u16 = 0;
    let mut truncated = false;

    for answer in answers {
        let mut rr = Vec::new();
        rr.extend_from_slice(&COMPRESSION_POINTER_TO_QUESTION);
        answer.rtype.to_network_bytes(&mut rr)?;
        QClass::IN.to_network_bytes(&mut rr)?;
        answer.ttl.to_network_bytes(&mut rr)?;
        (answer.rdata.len() as u16).to_network_bytes(&mut rr)?;
        rr.extend_from_slice(&answer.rdata);

        if HEADER_SIZE + body.len() + rr.len() > MAX_DNS_PACKET_SIZE {
            truncated = true;
            break;
        }

        body.extend_from_slice(&rr);
        an_count += 1;
    }

    if !truncated {
        if let Some(authority) = authority {
            let mut rr = Vec::new();
            rr.extend_from_slice(&authority.owner);
            QType::SOA.to_network_bytes(&mut rr)?;
            QClass::IN.to_network_bytes(&mut rr)?;
            authority.ttl.to_network_bytes(&mut rr)?;
            (authority.rdata.len() as u16).to_network_bytes(&mut rr)?;
            rr.extend_from_slice(&authority.rdata);

            if HEADER_SIZE + body.len() + rr.len() > MAX_DNS_PACKET_SIZE {
                truncated = true;
            } else {
                body.extend_from_slice(&rr);
                ns_count = 1;
            }
        }
    }

    let header = DNSPacketHeader {
        id,
        flags: DNSPacketFlags {
            packet_type: PacketType::Response,
            op_code: OpCode::Query,
            is_authorative_answer: true,
            is_truncated: truncated,
            is_recursion_desired: recursion_desired,
            is_recursion_available: false,
            z: false,
            authentic_data: false,
            checking_disabled: false,
            response_code: rcode,
        },
        qd_count: 1,
        an_count,
        ns_count,
        ar_count: 0,
    };

    let mut buffer = Vec::with_capacity(HEADER_SIZE + body.len());
    header.to_network_bytes(&mut buffer)?;
    buffer.extend_from_slice(&body);
    Ok(buffer)
}

/// Builds an error response with no answers, for the `ParseOutcome::Error`
/// and dispatch-time REFUSED/NXDOMAIN/NOERROR-empty cases. `question` is
/// `None` only when the packet was too malformed to recover even the
/// question section; in that case QDCOUNT is 0 in the reply.
pub fn build_error_response(
    id: u16,
    recursion_desired: bool,
    question: Option<&DNSQuestion<'_>>,
    rcode: ResponseCode,
) -> DNSResult<Vec<u8>> {
    let mut body = Vec::new();
    let qd_count = if let Some(q) = question {
        q.to_network_bytes(&mut body)?;
        1
    } else {
        0
    };

    let header = DNSPacketHeader {
        id,
        flags: DNSPacketFlags {
            packet_type: PacketType::Response,
            op_code: OpCode::Query,
            is_authorative_answer: false,
            is_truncated: false,
            is_recursion_desired: recursion_desired,
            is_recursion_available: false,
            z: false,
            authentic_data: false,
            checking_disabled: false,
            response_code: rcode,
        },
        qd_count,
        an_count: 0,
        ns_count: 0,
        ar_count: 0,
    };

    let mut buffer = Vec::with_capacity(HEADER_SIZE + body.len());
    header.to_network_bytes(&mut buffer)?;
    buffer.extend_from_slice(&body);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, DatasetKind};
    use crate::ip4set::Cidr;
    use crate::zone::Zone;

    fn raw_query(qname_wire: &[u8], qtype: QType, qclass: QClass) -> Vec<u8> {
        let header = DNSPacketHeader {
            id: 0x1234,
            flags: DNSPacketFlags {
                packet_type: PacketType::Query,
                op_code: OpCode::Query,
                is_recursion_desired: true,
                ..Default::default()
            },
            qd_count: 1,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        };

        let mut buf = Vec::new();
        header.to_network_bytes(&mut buf).unwrap();
        buf.extend_from_slice(qname_wire);
        buf.extend_from_slice(&(qtype as u16).to_be_bytes());
        buf.extend_from_slice(&(qclass as u16).to_be_bytes());
        buf
    }

    const SBL_QNAME: &[u8] = &[
        1, b'1', 1, b'0', 1, b'0', 2, b'1', b'0', 3, b's', b'b', b'l', 7, b'e', b'x', b'a', b'm',
        b'p', b'l', b'e', 0,
    ];

    fn sbl_zone() -> Zone {
        let mut zone = Zone::new("sbl.example", 2048);
        let mut dataset = Dataset::new_ip4(2048, Some("$text is listed".to_string()));
        if let DatasetKind::Ip4(set) = &mut dataset.kind {
            set.add(Cidr::parse("10.0.0.0/8", false).unwrap(), 2);
        }
        dataset.finalize();
        zone.datasets.push(dataset);
        zone
    }

    #[test]
    fn parses_a_well_formed_query() {
        let buf = raw_query(SBL_QNAME, QType::A, QClass::IN);
        match parse_query(&buf) {
            ParseOutcome::Query(q) => {
                assert_eq!(q.id, 0x1234);
                assert!(q.recursion_desired);
                assert_eq!(q.qtype, QType::A);
                assert_eq!(q.qname.to_string(), "1.0.0.10.sbl.example");
            }
            other => panic!("expected Query, got {:?}", other),
        }
    }

    #[test]
    fn too_short_packet_is_dropped() {
        let buf = vec![0u8; 4];
        assert!(matches!(parse_query(&buf), ParseOutcome::Drop));
    }

    #[test]
    fn listed_subject_dispatches_to_noerror_with_a_record() {
        let mut registry = ZoneRegistry::new();
        registry.insert(sbl_zone());

        let buf = raw_query(SBL_QNAME, QType::A, QClass::IN);
        let query = match parse_query(&buf) {
            ParseOutcome::Query(q) => q,
            other => panic!("expected Query, got {:?}", other),
        };

        let (rcode, answers, authority) = dispatch(&query, &registry);
        assert_eq!(rcode, ResponseCode::NoError);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].rdata, vec![127, 0, 0, 2]);
        assert!(authority.is_none());
    }

    #[test]
    fn unlisted_subject_dispatches_to_nxdomain() {
        let mut registry = ZoneRegistry::new();
        registry.insert(sbl_zone());

        const UNLISTED_QNAME: &[u8] = &[
            1, b'1', 1, b'1', 1, b'0', 2, b'1', b'0', 3, b's', b'b', b'l', 7, b'e', b'x', b'a',
            b'm', b'p', b'l', b'e', 0,
        ];
        let buf = raw_query(UNLISTED_QNAME, QType::A, QClass::IN);
        let query = match parse_query(&buf) {
            ParseOutcome::Query(q) => q,
            other => panic!("expected Query, got {:?}", other),
        };

        let (rcode, answers, authority) = dispatch(&query, &registry);
        assert_eq!(rcode, ResponseCode::NXDomain);
        assert!(answers.is_empty());
        assert!(authority.is_none());
    }

    #[test]
    fn nxdomain_carries_soa_authority_when_zone_declares_one() {
        let mut registry = ZoneRegistry::new();
        let mut zone = sbl_zone();
        zone.soa.mname = "ns1.sbl.example".to_string();
        zone.soa.rname = "hostmaster.sbl.example".to_string();
        zone.soa.minimum = 900;
        registry.insert(zone);

        const UNLISTED_QNAME: &[u8] = &[
            1, b'1', 1, b'1', 1, b'0', 2, b'1', b'0', 3, b's', b'b', b'l', 7, b'e', b'x', b'a',
            b'm', b'p', b'l', b'e', 0,
        ];
        let buf = raw_query(UNLISTED_QNAME, QType::A, QClass::IN);
        let query = match parse_query(&buf) {
            ParseOutcome::Query(q) => q,
            other => panic!("expected Query, got {:?}", other),
        };

        let (rcode, answers, authority) = dispatch(&query, &registry);
        assert_eq!(rcode, ResponseCode::NXDomain);
        assert!(answers.is_empty());
        let authority = authority.expect("zone declared $SOA");
        assert_eq!(authority.ttl, 900);

        let question = DNSQuestion::new("1.0.0.11.sbl.example", QType::A, Some(QClass::IN)).unwrap();
        let buf = build_response(
            query.id,
            query.recursion_desired,
            &question,
            rcode,
            &answers,
            Some(&authority),
        )
        .unwrap();
        assert!(buf.len() <= MAX_DNS_PACKET_SIZE);
        // NSCOUNT = 1
        assert_eq!(&buf[8..10], &[0x00, 0x01]);
    }

    #[test]
    fn name_outside_any_zone_is_refused() {
        let registry = ZoneRegistry::new();

        let buf = raw_query(SBL_QNAME, QType::A, QClass::IN);
        let query = match parse_query(&buf) {
            ParseOutcome::Query(q) => q,
            other => panic!("expected Query, got {:?}", other),
        };

        let (rcode, answers, authority) = dispatch(&query, &registry);
        assert_eq!(rcode, ResponseCode::Refused);
        assert!(answers.is_empty());
        assert!(authority.is_none());
    }

    #[test]
    fn txt_template_substitutes_the_subject_not_the_full_qname() {
        let mut registry = ZoneRegistry::new();
        registry.insert(sbl_zone());

        let buf = raw_query(SBL_QNAME, QType::TXT, QClass::IN);
        let query = match parse_query(&buf) {
            ParseOutcome::Query(q) => q,
            other => panic!("expected Query, got {:?}", other),
        };

        let (rcode, answers, _authority) = dispatch(&query, &registry);
        assert_eq!(rcode, ResponseCode::NoError);
        assert_eq!(answers.len(), 1);

        let rdata = &answers[0].rdata;
        let text = std::str::from_utf8(&rdata[1..]).unwrap();
        assert_eq!(text, "10.0.0.1 is listed");
    }

    #[test]
    fn built_response_echoes_id_and_sets_qr_aa() {
        let question = DNSQuestion::new("sbl.example", QType::A, Some(QClass::IN)).unwrap();
        let answer = SynthesizedAnswer {
            rtype: QType::A,
            ttl: 2048,
            rdata: vec![127, 0, 0, 2],
        };

        let buf =
            build_response(0xBEEF, true, &question, ResponseCode::NoError, &[answer], None).unwrap();
        assert_eq!(&buf[0..2], &[0xBE, 0xEF]);
        assert!(buf.len() <= MAX_DNS_PACKET_SIZE);

        // QR=1, AA=1
        assert_eq!(buf[2] & 0b1000_0100, 0b1000_0100);
    }

    #[test]
    fn question_name_with_compression_pointer_is_formerr_not_a_panic() {
        let header = DNSPacketHeader {
            id: 0x0099,
            flags: DNSPacketFlags {
                packet_type: PacketType::Query,
                op_code: OpCode::Query,
                ..Default::default()
            },
            qd_count: 1,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        };
        let mut buf = Vec::new();
        header.to_network_bytes(&mut buf).unwrap();
        // a question name that is nothing but an out-of-range compression
        // pointer — the kind of packet that used to panic the event loop.
        buf.extend_from_slice(&[0xC0, 0xFF]);
        buf.extend_from_slice(&(QType::A as u16).to_be_bytes());
        buf.extend_from_slice(&(QClass::IN as u16).to_be_bytes());

        match parse_query(&buf) {
            ParseOutcome::Error { rcode, id, question, .. } => {
                assert_eq!(rcode, ResponseCode::FormErr);
                assert_eq!(id, 0x0099);
                assert!(question.is_none());
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[test]
    fn malformed_qdcount_is_reported_as_formerr() {
        let header = DNSPacketHeader {
            id: 0x0042,
            flags: DNSPacketFlags {
                packet_type: PacketType::Query,
                op_code: OpCode::Query,
                ..Default::default()
            },
            qd_count: 2,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        };
        let mut buf = Vec::new();
        header.to_network_bytes(&mut buf).unwrap();
        buf.extend_from_slice(SBL_QNAME);
        buf.extend_from_slice(&(QType::A as u16).to_be_bytes());
        buf.extend_from_slice(&(QClass::IN as u16).to_be_bytes());

        match parse_query(&buf) {
            ParseOutcome::Error { rcode, id, .. } => {
                assert_eq!(rcode, ResponseCode::FormErr);
                assert_eq!(id, 0x0042);
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }
}
