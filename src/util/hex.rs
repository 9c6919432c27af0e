//! Converting from and to hex strings.

use std::fmt;


/// Encodes an octet sequence as an upper case hex string.
pub fn encode(src: &[u8]) -> String {
    let mut res = String::with_capacity(src.len() * 2);
    for &ch in src {
        let [high, low] = encode_u8(ch);
        res.push(char::from(high));
        res.push(char::from(low));
    }
    res
}

pub fn encode_u8(ch: u8) -> [u8; 2] {
    [DIGITS[usize::from(ch >> 4)], DIGITS[usize::from(ch & 0x0F)]]
}

/// Decodes a hex string, ignoring any colons between octets.
///
/// Returns `None` if the string contains anything but hex digits and colons
/// or if it contains an odd number of hex digits.
pub fn decode(src: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = src.bytes().filter(|&ch| ch != b':').collect();
    if digits.len() % 2 != 0 {
        return None
    }
    digits.chunks(2).map(|pair| {
        Some((decode_digit(pair[0])? << 4) | decode_digit(pair[1])?)
    }).collect()
}

fn decode_digit(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None
    }
}

const DIGITS: &[u8] = b"0123456789ABCDEF";


//------------ Colons --------------------------------------------------------

/// Displays octets as colon separated upper case hex.
///
/// This is the customary form for certificate fingerprints.
pub struct Colons<'a>(pub &'a [u8]);

impl fmt::Display for Colons<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (idx, &ch) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(":")?;
            }
            let [high, low] = encode_u8(ch);
            write!(f, "{}{}", char::from(high), char::from(low))?;
        }
        Ok(())
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_and_decode() {
        assert_eq!(encode(b"\x01\xab\xff"), "01ABFF");
        assert_eq!(decode("01ABff").unwrap(), b"\x01\xab\xff");
        assert_eq!(decode("01:AB:FF").unwrap(), b"\x01\xab\xff");
        assert_eq!(decode("01A"), None);
        assert_eq!(decode("0G"), None);
    }

    #[test]
    fn colons() {
        assert_eq!(Colons(b"\x01\xab\xff").to_string(), "01:AB:FF");
        assert_eq!(Colons(b"").to_string(), "");
    }
}
