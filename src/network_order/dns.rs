//! `ToFromNetworkOrder` impls for the RFC1035 message structures.
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Result};
use std::str;

use crate::derive_enum;
use crate::error::{DNSError, DNSResult};
use crate::network_order::ToFromNetworkOrder;
use crate::rfc1035::{
    CharacterString, DNSPacket, DNSPacketFlags, DNSPacketHeader, DNSQuestion, DomainName, OpCode,
    PacketType, QClass, QType, ResponseCode,
};

impl<'a> ToFromNetworkOrder<'a> for CharacterString<'a> {
    /// ```
    /// use rbldlib::network_order::ToFromNetworkOrder;
    /// use rbldlib::rfc1035::CharacterString;
    ///
    /// let cs = CharacterString("google");
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert_eq!(cs.to_network_bytes(&mut buffer).unwrap(), 7);
    /// assert_eq!(buffer, &[0x06, b'g', b'o', b'o', b'g', b'l', b'e']);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        buffer.write_u8(self.0.len() as u8)?;
        buffer.extend_from_slice(self.0.as_bytes());
        Ok(self.0.len() + 1)
    }

    /// ```
    /// use std::io::Cursor;
    /// use rbldlib::network_order::ToFromNetworkOrder;
    /// use rbldlib::rfc1035::CharacterString;
    ///
    /// let mut buffer = Cursor::new([0x06_u8, 0x67, 0x6f, 0x6f, 0x67, 0x6c, 0x65].as_slice());
    /// let mut cs = CharacterString::default();
    /// assert!(cs.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(cs.0, "google");
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&'a [u8]>) -> DNSResult<()> {
        let size = buffer.read_u8()? as usize;
        let position = buffer.position() as usize;
        let reference = buffer.get_ref();

        self.0 = str::from_utf8(&reference[position..position + size])?;
        buffer.set_position((position + size) as u64);
        Ok(())
    }
}

impl<'a> ToFromNetworkOrder<'a> for DomainName<'a> {
    /// ```
    /// use rbldlib::rfc1035::DomainName;
    /// use rbldlib::network_order::ToFromNetworkOrder;
    ///
    /// let dn = DomainName::try_from("www.google.ie").unwrap();
    /// let mut buffer: Vec<u8> = Vec::new();
    ///
    /// assert_eq!(dn.to_network_bytes(&mut buffer).unwrap(), 15);
    /// assert_eq!(&buffer, &[0x03, b'w', b'w', b'w', 0x06, b'g', b'o', b'o', b'g', b'l', b'e', 0x02, b'i', b'e', 0x00]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        let mut length = 0usize;

        for label in &self.0 {
            buffer.write_u8(label.len() as u8)?;
            buffer.extend_from_slice(label.as_bytes());
            length += label.len() + 1;
        }

        // sentinel null label
        buffer.write_u8(0)?;

        Ok(length + 1)
    }

    /// ```
    /// use std::io::Cursor;
    /// use rbldlib::network_order::ToFromNetworkOrder;
    /// use rbldlib::rfc1035::DomainName;
    ///
    /// let b = vec![0x03, b'w', b'w', b'w', 0x06, b'g', b'o', b'o', b'g', b'l', b'e', 0x02, b'i', b'e', 0x00];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut dn = DomainName::default();
    /// assert!(dn.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(&dn.to_string(), "www.google.ie");
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&'a [u8]>) -> DNSResult<()> {
        // RFC1035 4.1.4: a name ends either in a zero-length label, a
        // compression pointer, or a sequence of labels ending with a pointer.
        let start_position = buffer.position() as usize;

        let sentinel = buffer
            .by_ref()
            .bytes()
            .skip_while(|x| *x.as_ref().unwrap_or(&0) != 0 && x.as_ref().unwrap_or(&0) < &192)
            .next();

        let sentinel = match sentinel {
            Some(byte) => byte?,
            None => return Err(DNSError::new("malformed domain name: no terminator found")),
        };
        debug_assert!(crate::util::is_pointer(sentinel) || sentinel == 0);

        let end_position = buffer.position() as usize;

        if sentinel == 0 {
            self.from_slice(&buffer.get_ref()[start_position..end_position])?;
        } else {
            // compression pointer: two octets, top two bits set
            let low = buffer.read_u8()?;
            let pointer = (u16::from_be_bytes([sentinel, low]) & 0x3FFF) as usize;

            if pointer >= buffer.get_ref().len() {
                return Err(DNSError::new("compression pointer out of range"));
            }

            if end_position - start_position == 1 {
                self.from_slice(&buffer.get_ref()[pointer..])?;
            } else {
                self.from_slice(&buffer.get_ref()[start_position..end_position - 1])?;
                self.from_slice(&buffer.get_ref()[pointer..])?;
            }
        }

        Ok(())
    }
}

derive_enum!(QType, u16);
derive_enum!(QClass, u16);
derive_enum!(PacketType, u16);

impl<'a> ToFromNetworkOrder<'a> for DNSPacketFlags {
    /// ```
    /// use rbldlib::network_order::ToFromNetworkOrder;
    /// use rbldlib::rfc1035::{DNSPacketFlags, ResponseCode, OpCode, PacketType};
    ///
    /// let flags = DNSPacketFlags {
    ///     packet_type: PacketType::Response,
    ///     op_code: OpCode::Query,
    ///     is_authorative_answer: true,
    ///     is_truncated: false,
    ///     is_recursion_desired: false,
    ///     is_recursion_available: true,
    ///     z: false,
    ///     authentic_data: false,
    ///     checking_disabled: false,
    ///     response_code: ResponseCode::NoError
    /// };
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert!(flags.to_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(buffer, &[0b1000_0100, 0b0000_0000]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        //                               1  1  1  1  1  1
        // 0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // |QR|   Opcode  |AA|TC|RD|RA| Z|AD|CD|   RCODE   |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        let mut flags = (self.packet_type as u16) << 15;
        flags |= (self.op_code as u16) << 11;
        flags |= (self.is_authorative_answer as u16) << 10;
        flags |= (self.is_truncated as u16) << 9;
        flags |= (self.is_recursion_desired as u16) << 8;
        flags |= (self.is_recursion_available as u16) << 7;
        flags |= (self.z as u16) << 6;
        flags |= (self.authentic_data as u16) << 5;
        flags |= (self.checking_disabled as u16) << 4;
        flags |= self.response_code as u16;

        buffer.write_u16::<BigEndian>(flags)?;
        Ok(2)
    }

    /// ```
    /// use std::io::Cursor;
    /// use rbldlib::network_order::ToFromNetworkOrder;
    /// use rbldlib::rfc1035::{DNSPacketFlags, ResponseCode, OpCode, PacketType};
    ///
    /// let b = vec![0b1000_0100, 0b0000_0000];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = DNSPacketFlags::default();
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v.packet_type, PacketType::Response);
    /// assert_eq!(v.op_code, OpCode::Query);
    /// assert!(v.is_authorative_answer);
    /// assert!(v.is_recursion_available);
    /// assert_eq!(v.response_code, ResponseCode::NoError);
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DNSResult<()> {
        let flags = buffer.read_u16::<BigEndian>()?;

        let packet_type = flags >> 15;
        self.packet_type = packet_type.try_into()?;
        self.op_code = OpCode::try_from((flags >> 11) & 0b1111)?;
        self.is_authorative_answer = (flags >> 10) & 1 == 1;
        self.is_truncated = (flags >> 9) & 1 == 1;
        self.is_recursion_desired = (flags >> 8) & 1 == 1;
        self.is_recursion_available = (flags >> 7) & 1 == 1;
        self.z = (flags >> 6) & 1 == 1;
        self.authentic_data = (flags >> 5) & 1 == 1;
        self.checking_disabled = (flags >> 4) & 1 == 1;
        self.response_code = ResponseCode::try_from(flags & 0b1111)?;

        Ok(())
    }
}

// DNSPacketHeader and DNSQuestion derive their ToFromNetworkOrder impl via
// #[derive(DnsStruct)] in rfc1035.rs.

impl<'a, T> ToFromNetworkOrder<'a> for DNSPacket<T>
where
    T: ToFromNetworkOrder<'a>,
{
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        let mut length = self.header.to_network_bytes(buffer)?;
        length += self.data.to_network_bytes(buffer)?;
        Ok(length)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&'a [u8]>) -> DNSResult<()> {
        self.header.from_network_bytes(buffer)?;
        self.data.from_network_bytes(buffer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_string_roundtrip() {
        let cs = CharacterString("hello");
        let (buffer, length) = crate::test_to_network!(cs);
        assert_eq!(length, 6);

        let out = crate::test_from_network!(buffer.as_slice(), CharacterString);
        assert_eq!(out.0, "hello");
    }

    #[test]
    fn out_of_range_compression_pointer_is_rejected() {
        // 0xC0, 0xFF points at offset 0x3FF, far past this 2-byte buffer.
        let b = [0xC0_u8, 0xFF];
        let mut buffer = Cursor::new(b.as_slice());
        let mut dn = DomainName::default();
        assert!(dn.from_network_bytes(&mut buffer).is_err());
    }

    #[test]
    fn in_range_compression_pointer_is_followed() {
        // "www" at offset 0, then a pointer back to it.
        let b = [3, b'w', b'w', b'w', 0, 0xC0, 0x00];
        let mut buffer = Cursor::new(b.as_slice());
        buffer.set_position(5);
        let mut dn = DomainName::default();
        assert!(dn.from_network_bytes(&mut buffer).is_ok());
        assert_eq!(dn.0, &["www"]);
    }

    #[test]
    fn flags_roundtrip() {
        let flags = DNSPacketFlags {
            packet_type: PacketType::Query,
            op_code: OpCode::Query,
            is_authorative_answer: false,
            is_truncated: false,
            is_recursion_desired: false,
            is_recursion_available: false,
            z: false,
            authentic_data: false,
            checking_disabled: false,
            response_code: ResponseCode::NoError,
        };

        let (buffer, length) = crate::test_to_network!(flags);
        assert_eq!(length, 2);

        let decoded = crate::test_from_network!(buffer.as_slice(), DNSPacketFlags);
        assert_eq!(decoded.packet_type, PacketType::Query);
        assert_eq!(decoded.response_code, ResponseCode::NoError);
    }
}
