//! Module for some utility functions, including debug
//!
use std::char;
use std::io::Cursor;

// A domain name label sequence ends either with a zero length octet, or with
// a compression pointer whose two high bits are set (RFC1035 4.1.4).
pub fn is_pointer(x: u8) -> bool {
    x >= 192
}

// Debug utility
pub fn pretty_cursor<'a>(buffer: &Cursor<&'a [u8]>) {
    let reference = buffer.get_ref();

    eprintln!("position={}", buffer.position());

    let mut i = 0usize;
    eprint!("index:");
    for _ in *reference {
        eprint!("{:02} ", i);
        i += 1;
    }
    eprintln!();

    eprint!("byte :");
    for x in *reference {
        eprint!("{:02X} ", x);
    }
    eprintln!();

    eprint!("ascii:");
    for x in *reference {
        let c = char::from_u32(*x as u32).unwrap();
        if c.is_ascii_alphanumeric() {
            eprint!("{:>2} ", char::from_u32(*x as u32).unwrap());
        } else {
            eprint!("   ");
        }
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_detection() {
        assert!(!is_pointer(0));
        assert!(!is_pointer(191));
        assert!(is_pointer(192));
        assert!(is_pointer(255));
    }
}
