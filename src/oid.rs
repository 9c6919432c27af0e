//! The object identifiers used in this crate.
//!
//! This module collects all the object identifiers used at various places
//! in this crate in one central place. They are public so you can refer to
//! them should that ever become necessary.
//!
//! In addition to the constants used while decoding, the module provides a
//! registry that maps the field names used by MCP to the dotted-decimal form
//! of their object identifiers and back. The MCP specific identifiers live
//! below the `2.25` UUID arc and are therefore too long for most tooling.
//! Some tools print those as _arc notation_, e.g., `2.25.{69A2B9...}`, with
//! the raw base-128 octets as hex. [`decode_arc_notation`] turns those back
//! into the proper dotted-decimal form.

use std::fmt::Write;
use bcder::{ConstOid, Oid};
use bytes::Bytes;


//------------ Constants -----------------------------------------------------

/// [RFC 4055](https://tools.ietf.org/html/rfc4055) `id-sha256`
///
/// Identifies the SHA-256 one-way hash function.
pub const SHA256: ConstOid
    = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 1]);

/// [RFC 4055](https://tools.ietf.org/html/rfc4055) `rsaEncryption`
///
/// Identifies an RSA public key with no limitation to either RSASSA-PSS or
/// RSAES-OEAP.
pub const RSA_ENCRYPTION: ConstOid
    = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 1]);

/// [RFC 4055](https://tools.ietf.org/html/rfc4055) `sha256WithRSAEncryption`
///
/// Identifies the PKCS #1 version 1.5 signature algorithm with SHA-256.
pub const SHA256_WITH_RSA_ENCRYPTION: ConstOid
    = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 11]);

/// [RFC 5480](https://tools.ietf.org/html/rfc5480) `ecPublicKey`.
///
/// Identifies public keys for elliptic curve cryptography.
pub const EC_PUBLIC_KEY: ConstOid = Oid(&[42, 134, 72, 206, 61, 2, 1]);

/// [RFC 5480](https://tools.ietf.org/html/rfc5480) `secp256r1`.
///
/// Identifies the P-256 curve for elliptic curve cryptography.
pub const SECP256R1: ConstOid = Oid(&[42, 134, 72, 206, 61, 3, 1, 7]);

/// [RFC 5480](https://tools.ietf.org/html/rfc5480) `secp384r1`.
///
/// Identifies the P-384 curve for elliptic curve cryptography. MIRs use
/// this curve for most of their keys.
pub const SECP384R1: ConstOid = Oid(&[43, 129, 4, 0, 34]);

/// [RFC 5758](https://tools.ietf.org/html/rfc5758) `ecdsa-with-SHA256`.
pub const ECDSA_WITH_SHA256: ConstOid
    = Oid(&[42, 134, 72, 206, 61, 4, 3, 2]);

/// [RFC 5758](https://tools.ietf.org/html/rfc5758) `ecdsa-with-SHA384`.
pub const ECDSA_WITH_SHA384: ConstOid
    = Oid(&[42, 134, 72, 206, 61, 4, 3, 3]);

pub const AD_OCSP: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 48, 1]);

pub const AT_COMMON_NAME: ConstOid = Oid(&[85, 4, 3]); // 2 5 4 3
pub const AT_COUNTRY_NAME: ConstOid = Oid(&[85, 4, 6]); // 2 5 4 6
pub const AT_ORGANIZATION_NAME: ConstOid = Oid(&[85, 4, 10]); // 2 5 4 10
pub const AT_ORGANIZATIONAL_UNIT: ConstOid = Oid(&[85, 4, 11]); // 2 5 4 11
pub const AT_EMAIL_ADDRESS: ConstOid
    = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 1]);

/// [RFC 4519](https://tools.ietf.org/html/rfc4519) `uid`.
///
/// The attribute carrying the MRN of subject and issuer.
pub const AT_UID: ConstOid
    = Oid(&[9, 146, 38, 137, 147, 242, 44, 100, 1, 1]);

pub const CE_AUTHORITY_KEY_IDENTIFIER: ConstOid = Oid(&[85, 29, 35]);
pub const CE_BASIC_CONSTRAINTS: ConstOid = Oid(&[85, 29, 19]);
pub const CE_KEY_USAGE: ConstOid = Oid(&[85, 29, 15]);
pub const CE_SUBJECT_ALT_NAME: ConstOid = Oid(&[85, 29, 17]);
pub const CE_SUBJECT_KEY_IDENTIFIER: ConstOid = Oid(&[85, 29, 14]);

pub const PE_AUTHORITY_INFO_ACCESS: ConstOid
    = Oid(&[43, 6, 1, 5, 5, 7, 1, 1]);
pub const PE_SUBJECT_INFO_ACCESS: ConstOid
    = Oid(&[43, 6, 1, 5, 5, 7, 1, 11]);


//------------ Registry ------------------------------------------------------

/// The names and dotted-decimal object identifiers known to MCP.
const REGISTRY: &[(&str, &str)] = &[
    // Attributes of distinguished names.
    ("country", "2.5.4.6"),
    ("name", "2.5.4.3"),
    ("email", "1.2.840.113549.1.9.1"),
    ("organization", "2.5.4.10"),
    ("unit", "2.5.4.11"),
    ("uid", "0.9.2342.19200300.100.1.1"),

    // Algorithms and extensions used with OCSP.
    ("sha1", "1.3.14.3.2.26"),
    ("sha256", "2.16.840.1.101.3.4.2.1"),
    ("nonce", "1.3.6.1.5.5.7.48.1.2"),

    // Certificate extensions.
    ("subjectAltName", "2.5.29.17"),
    ("authorityKeyIdentifier", "2.5.29.35"),
    ("subjectKeyIdentifier", "2.5.29.14"),
    ("basicConstraints", "2.5.29.19"),
    ("authorityInfoAccess", "1.3.6.1.5.5.7.1.1"),
    ("subjectInfoAccess", "1.3.6.1.5.5.7.1.11"),

    // Access methods.
    ("ocsp", "1.3.6.1.5.5.7.48.1"),
    ("x5u", "2.25.225758541249626787560521749862278982872"),
    ("matp", "2.25.110111187235111034673021170401583226313"),

    // MCP subject alternative names.
    ("flagState", "2.25.323100633285601570573910217875371967771"),
    ("callSign", "2.25.208070283325144527098121348946972755227"),
    ("IMONumber", "2.25.291283622413876360871493815653100799259"),
    ("MMSI", "2.25.328433707816814908768060331477217690907"),
    ("shipType", "2.25.107857171638679641902842130101018412315"),
    ("homePort", "2.25.285632790821948647314354670918887798603"),
    ("secondaryMRN", "2.25.268095117363717005222833833642941669792"),
    ("URL", "2.25.245076023612240385163414144226581328607"),
];

/// Returns the registered name for a dotted-decimal object identifier.
pub fn name_of(dotted: &str) -> Option<&'static str> {
    REGISTRY.iter().find_map(|&(name, oid)| {
        if oid == dotted { Some(name) } else { None }
    })
}

/// Returns the dotted-decimal object identifier registered for a name.
pub fn oid_of(name: &str) -> Option<&'static str> {
    REGISTRY.iter().find_map(|&(key, oid)| {
        if key == name { Some(oid) } else { None }
    })
}

/// Looks up the registry in either direction.
///
/// If `key` is a registered name, returns its object identifier. If it is a
/// registered object identifier, in dotted-decimal or arc notation, returns
/// its name.
pub fn lookup(key: &str) -> Option<&'static str> {
    oid_of(key).or_else(|| name_of(&decode_arc_notation(key)))
}


//------------ Conversions ---------------------------------------------------

/// Converts the content octets of an object identifier to dotted decimal.
///
/// Returns `None` if the octets are not a correctly encoded identifier or if
/// a component exceeds 128 bits.
pub fn to_dotted(octets: &[u8]) -> Option<String> {
    let mut components = Vec::new();
    let mut value: u128 = 0;
    let mut pending = false;
    for &octet in octets {
        if value > (u128::MAX >> 7) {
            return None
        }
        value = (value << 7) | u128::from(octet & 0x7F);
        if octet & 0x80 == 0 {
            components.push(value);
            value = 0;
            pending = false;
        }
        else {
            pending = true;
        }
    }
    if pending || components.is_empty() {
        return None
    }

    let mut res = String::new();
    let first = components[0];
    let (a, b) = if first < 40 { (0, first) }
                 else if first < 80 { (1, first - 40) }
                 else { (2, first - 80) };
    write!(res, "{}.{}", a, b).ok()?;
    for component in &components[1..] {
        write!(res, ".{}", component).ok()?;
    }
    Some(res)
}

/// Returns the dotted-decimal form of an object identifier.
pub fn oid_to_dotted<T: AsRef<[u8]>>(oid: &Oid<T>) -> Option<String> {
    to_dotted(oid.0.as_ref())
}

/// Encodes a dotted-decimal object identifier into its content octets.
pub fn from_dotted(dotted: &str) -> Option<Bytes> {
    let mut components = dotted.split('.').map(|s| s.parse::<u128>());
    let first = components.next()?.ok()?;
    let second = components.next()?.ok()?;
    if first > 2 || (first < 2 && second >= 40) {
        return None
    }
    let mut res = Vec::new();
    push_base128(&mut res, first.checked_mul(40)?.checked_add(second)?);
    for component in components {
        push_base128(&mut res, component.ok()?);
    }
    Some(Bytes::from(res))
}

/// Converts a dotted-decimal object identifier into a bcder `Oid`.
pub fn oid_from_dotted(dotted: &str) -> Option<Oid<Bytes>> {
    from_dotted(dotted).map(Oid)
}

/// Returns the object identifier registered under the given name.
pub fn by_name(name: &str) -> Option<Oid<Bytes>> {
    oid_of(name).and_then(oid_from_dotted)
}

fn push_base128(target: &mut Vec<u8>, mut value: u128) {
    let mut groups = [0u8; 19];
    let mut len = 0;
    loop {
        groups[len] = (value & 0x7F) as u8;
        len += 1;
        value >>= 7;
        if value == 0 {
            break
        }
    }
    for idx in (0..len).rev() {
        if idx > 0 {
            target.push(groups[idx] | 0x80)
        }
        else {
            target.push(groups[idx])
        }
    }
}

/// Decodes the compact arc notation `2.25.{HEX}` into dotted decimal.
///
/// The hex string holds the base-128 octets of the component. Each octet
/// contributes its lower seven bits. Any other input is returned unchanged,
/// as is arc notation that doesn’t fit into 128 bits.
pub fn decode_arc_notation(value: &str) -> String {
    let hex = match value.strip_prefix("2.25.{")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(hex) => hex,
        None => return value.into()
    };
    if hex.is_empty() || hex.len() % 2 != 0
        || !hex.bytes().all(|ch| ch.is_ascii_hexdigit())
    {
        return value.into()
    }
    let mut component: u128 = 0;
    for idx in (0..hex.len()).step_by(2) {
        let octet = match u8::from_str_radix(&hex[idx..idx + 2], 16) {
            Ok(octet) => octet,
            Err(_) => return value.into()
        };
        if component > (u128::MAX >> 7) {
            return value.into()
        }
        component = (component << 7) | u128::from(octet & 0x7F);
    }
    format!("2.25.{}", component)
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry_both_ways() {
        assert_eq!(oid_of("callSign"),
            Some("2.25.208070283325144527098121348946972755227")
        );
        assert_eq!(
            name_of("2.25.208070283325144527098121348946972755227"),
            Some("callSign")
        );
        assert_eq!(lookup("MMSI"), oid_of("MMSI"));
        assert_eq!(lookup("2.5.29.17"), Some("subjectAltName"));
        assert_eq!(lookup("1.2.3.4"), None);
    }

    #[test]
    fn dotted_round_trip_for_registry() {
        for &(name, dotted) in REGISTRY {
            let octets = from_dotted(dotted).unwrap();
            assert_eq!(to_dotted(&octets).as_deref(), Some(dotted), "{}", name);
        }
    }

    #[test]
    fn constants_match_registry() {
        assert_eq!(
            oid_to_dotted(&AT_UID).as_deref(), oid_of("uid")
        );
        assert_eq!(
            oid_to_dotted(&CE_SUBJECT_ALT_NAME).as_deref(),
            oid_of("subjectAltName")
        );
        assert_eq!(
            oid_to_dotted(&PE_SUBJECT_INFO_ACCESS).as_deref(),
            oid_of("subjectInfoAccess")
        );
        assert_eq!(
            oid_to_dotted(&AD_OCSP).as_deref(), oid_of("ocsp")
        );
    }

    #[test]
    fn call_sign_from_certificate_octets() {
        // The octets as they appear in an actual MIR certificate.
        let octets = [
            0x69, 0x82, 0xb9, 0x88, 0xf0, 0xc0, 0x9b, 0xaf, 0xf8, 0xc7,
            0xcb, 0xa9, 0xbd, 0xc0, 0x80, 0xaa, 0xae, 0xd7, 0x8a, 0x1b
        ];
        let dotted = to_dotted(&octets).unwrap();
        assert_eq!(name_of(&dotted), Some("callSign"));
    }

    #[test]
    fn arc_notation() {
        assert_eq!(
            decode_arc_notation(
                "2.25.{82B988F0C09BAFF8C7CBA9BDC080AAAED78A1B}"
            ),
            "2.25.208070283325144527098121348946972755227"
        );
        assert_eq!(decode_arc_notation("2.25.{817F}"), "2.25.255");
        assert_eq!(decode_arc_notation("2.5.29.17"), "2.5.29.17");
        assert_eq!(decode_arc_notation("2.25.{XYZ}"), "2.25.{XYZ}");
        assert_eq!(
            lookup("2.25.{82B988F0C09BAFF8C7CBA9BDC080AAAED78A1B}"),
            Some("callSign")
        );
    }

    #[test]
    fn malformed_octets() {
        assert_eq!(to_dotted(&[]), None);
        assert_eq!(to_dotted(&[0x85]), None);
        assert_eq!(from_dotted("3.1"), None);
        assert_eq!(from_dotted("1.40"), None);
        assert_eq!(from_dotted("1"), None);
    }
}
