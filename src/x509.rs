//! Types common to all things X.509.

use std::{error, fmt, io, ops, str};
use std::convert::Infallible;
use std::str::FromStr;
use std::time::SystemTime;
use bcder::{decode, encode};
use bcder::{BitString, Captured, ConstOid, Mode, OctetString, Oid, Tag};
use bcder::decode::{DecodeError, ContentError, Source};
use bcder::encode::PrimitiveContent;
use bcder::Unsigned;
use bytes::Bytes;
use chrono::{
    Datelike, DateTime, LocalResult, TimeDelta, Timelike, TimeZone, Utc
};
use crate::crypto::{
    PublicKey, Signature, SignatureAlgorithm, VerificationError,
};
use crate::util::hex;


//------------ Functions -----------------------------------------------------

/// Returns an encoder for a single certificate extension.
pub fn encode_extension<V: encode::Values>(
    oid: &'static ConstOid,
    critical: bool,
    content: V
) -> impl encode::Values {
    encode::sequence((
        oid.encode(),
        if critical {
            Some(critical.encode())
        }
        else {
            None
        },
        OctetString::encode_wrapped(Mode::Der, content)
    ))
}


//------------ Name ----------------------------------------------------------

/// A distinguished name.
///
/// The name is kept in its encoded form. The attributes can be extracted
/// via [`attributes`][Self::attributes].
#[derive(Clone, Debug)]
pub struct Name(Captured);

impl Name {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.capture(|cons| {
            cons.take_sequence(|cons| { // RDNSequence
                while let Some(()) = cons.take_opt_set(|cons| {
                    let mut empty_set = true;
                    while let Some(()) = cons.take_opt_sequence(|cons| {
                        empty_set = false;
                        Oid::skip_in(cons)?;
                        if cons.skip_one()?.is_none() {
                            return Err(cons.content_err(
                                "invalid name"
                            ))
                        }
                        Ok(())
                    })? { }
                    if empty_set {
                        return Err(cons.content_err(
                            "empty relative distinguished name"
                        ));
                    }
                    Ok(())
                })? { }
                Ok(())
            })
        }).map(Name)
    }

    /// Creates a name from a list of attributes.
    ///
    /// Each attribute ends up in its own relative distinguished name. The
    /// country is encoded as a PrintableString, the email address as an
    /// IA5String, and everything else as a UTF8String.
    pub fn from_attributes(attrs: &[(&'static ConstOid, &str)]) -> Self {
        let values = encode::sequence(
            encode::iter(attrs.iter().map(|&(oid, value)| {
                let tag = if *oid == crate::oid::AT_COUNTRY_NAME {
                    Tag::PRINTABLE_STRING
                }
                else if *oid == crate::oid::AT_EMAIL_ADDRESS {
                    Tag::IA5_STRING
                }
                else {
                    Tag::UTF8_STRING
                };
                encode::set(
                    encode::sequence((
                        oid.encode(),
                        OctetString::new(
                            Bytes::copy_from_slice(value.as_bytes())
                        ).encode_as(tag)
                    ))
                )
            }))
        );
        Name(Captured::from_values(Mode::Der, values))
    }

    /// Returns all attributes of the name in order.
    ///
    /// The values are returned as strings no matter which of the string
    /// types was used in the encoding.
    pub fn attributes(
        &self
    ) -> Result<Vec<(Oid<Bytes>, String)>, DecodeError<Infallible>> {
        self.0.clone().decode(|cons| {
            cons.take_sequence(|cons| {
                let mut res = Vec::new();
                while let Some(()) = cons.take_opt_set(|cons| {
                    while let Some(()) = cons.take_opt_sequence(|cons| {
                        let oid = Oid::take_from(cons)?;
                        let value = cons.take_value(|_, content| {
                            OctetString::from_content(content)
                        })?;
                        res.push((
                            oid,
                            String::from_utf8_lossy(
                                value.to_bytes().as_ref()
                            ).into_owned()
                        ));
                        Ok(())
                    })? { }
                    Ok(())
                })? { }
                Ok(res)
            })
        })
    }

    /// Returns the value of the first attribute with the given type.
    pub fn attribute(&self, oid: &ConstOid) -> Option<String> {
        self.attributes().ok()?.into_iter().find_map(|(id, value)| {
            if id == *oid { Some(value) } else { None }
        })
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        &self.0
    }
}

//--- PartialEq and Eq

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl Eq for Name {}


//------------ Serial --------------------------------------------------------

/// A certificate serial number.
///
/// The serial is kept as the octets of its minimal encoding.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Serial(Bytes);

impl Serial {
    /// Creates a serial number from the octets of an unsigned integer.
    pub fn from_slice(s: &[u8]) -> Result<Self, SerialSliceError> {
        let start = s.iter().position(|&ch| ch != 0).unwrap_or(s.len());
        let s = &s[start..];
        if s.len() > 20 {
            return Err(SerialSliceError)
        }
        if s.is_empty() {
            return Ok(Serial(Bytes::from_static(b"\0")))
        }
        let mut res = Vec::with_capacity(s.len() + 1);
        if s[0] & 0x80 != 0 {
            res.push(0);
        }
        res.extend_from_slice(s);
        Ok(Serial(res.into()))
    }

    /// Creates a random serial number of 16 octets.
    pub fn random() -> Result<Self, ring::error::Unspecified> {
        use ring::rand::SecureRandom;

        let mut res = [0u8; 16];
        ring::rand::SystemRandom::new().fill(&mut res)?;
        res[0] &= 0x7F;
        res[0] |= 0x01;
        Ok(Serial(Bytes::copy_from_slice(&res)))
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        Unsigned::take_from(cons).and_then(|s| {
            Self::from_slice(s.as_ref()).map_err(|err| cons.content_err(err))
        })
    }

    /// Returns the value octets without any leading zero octet.
    pub fn as_slice(&self) -> &[u8] {
        match self.0.split_first() {
            Some((0, rest)) if !rest.is_empty() => rest,
            _ => self.0.as_ref()
        }
    }
}

impl From<u128> for Serial {
    fn from(value: u128) -> Self {
        // 16 octets never exceed the limit of 20.
        let bytes = value.to_be_bytes();
        let start = bytes.iter().position(|&ch| ch != 0).unwrap_or(15);
        let mut res = Vec::with_capacity(17);
        if bytes[start] & 0x80 != 0 {
            res.push(0);
        }
        res.extend_from_slice(&bytes[start..]);
        Serial(res.into())
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(self.as_slice()))
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Serial({self})")
    }
}

impl PrimitiveContent for Serial {
    const TAG: Tag = Tag::INTEGER;

    fn encoded_len(&self, _mode: Mode) -> usize {
        self.0.len()
    }

    fn write_encoded<W: io::Write>(
        &self,
        _mode: Mode,
        target: &mut W
    ) -> Result<(), io::Error> {
        target.write_all(self.0.as_ref())
    }
}


//------------ SignedData ----------------------------------------------------

/// Data signed by someone.
///
/// This is the outer structure of a certificate: the captured signed
/// content followed by the signature algorithm and value.
#[derive(Clone, Debug)]
pub struct SignedData {
    data: Captured,
    signature: Signature,
}

impl SignedData {
    pub fn new(data: Captured, signature: Signature) -> Self {
        Self { data, signature }
    }

    pub fn data(&self) -> &Captured {
        &self.data
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    pub fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        Ok(SignedData {
            data: cons.capture_one()?,
            signature: Signature::new(
                SignatureAlgorithm::x509_take_from(cons)?,
                BitString::take_from(cons)?.octet_bytes()
            )
        })
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            &self.data,
            self.signature.algorithm().x509_encode(),
            BitString::new(0, self.signature.value().clone()).encode(),
        ))
    }

    pub fn verify_signature(
        &self,
        public_key: &PublicKey
    ) -> Result<(), VerificationError> {
        public_key.verify(self.data.as_slice(), &self.signature)
    }
}


//------------ Time ----------------------------------------------------------

/// A point in time as used in certificates and tokens.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd,
    serde::Serialize, serde::Deserialize
)]
pub struct Time(DateTime<Utc>);

impl Time {
    pub fn new(dt: DateTime<Utc>) -> Self {
        Time(dt)
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Creates a time from a number of seconds since the Unix epoch.
    ///
    /// This is the representation used by the `iat`, `nbf`, and `exp`
    /// claims of JSON Web Tokens.
    pub fn from_timestamp(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Time)
    }

    pub fn utc(
        year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32
    ) -> Option<Self> {
        match Utc.with_ymd_and_hms(year, month, day, hour, min, sec) {
            LocalResult::Single(dt) => Some(Time(dt)),
            _ => None
        }
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive(|tag, prim| {
            let year = match tag {
                Tag::UTC_TIME => {
                    // RFC 5280 requires the format YYMMDDHHMMSSZ
                    let year = read_two_char(prim)? as i32;
                    if year >= 50 { year + 1900 } else { year + 2000 }
                }
                Tag::GENERALIZED_TIME => {
                    // RFC 5280 requires the format YYYYMMDDHHMMSSZ
                    read_four_char(prim)? as i32
                }
                _ => {
                    return Err(prim.content_err("malformed time value"))
                }
            };
            let res = (
                year,
                read_two_char(prim)?,
                read_two_char(prim)?,
                read_two_char(prim)?,
                read_two_char(prim)?,
                read_two_char(prim)?,
            );
            if prim.take_u8()? != b'Z' {
                return Err(prim.content_err("malformed time value"))
            }
            Self::from_parts(res).map_err(|err| prim.content_err(err))
        })
    }

    fn from_parts(
        parts: (i32, u32, u32, u32, u32, u32)
    ) -> Result<Self, ContentError> {
        Self::utc(
            parts.0, parts.1, parts.2, parts.3, parts.4, parts.5
        ).ok_or_else(|| ContentError::from_static("malformed time value"))
    }

    pub fn verify_not_before(
        &self,
        now: Time
    ) -> Result<(), ValidityPeriodError> {
        if now.0 < self.0 {
            Err(ValidityPeriodError::too_new())
        }
        else {
            Ok(())
        }
    }

    pub fn verify_not_after(
        &self,
        now: Time
    ) -> Result<(), ValidityPeriodError> {
        if now.0 > self.0 {
            Err(ValidityPeriodError::too_old())
        }
        else {
            Ok(())
        }
    }

    pub fn encode_utc_time(self) -> impl encode::Values {
        UtcTime(self).encode()
    }

    pub fn encode_generalized_time(self) -> impl encode::Values {
        GeneralizedTime(self).encode()
    }

    pub fn encode_varied(self) -> impl encode::Values {
        if self.year() < 1950 || self.year() > 2049 {
            (None, Some(self.encode_generalized_time()))
        }
        else {
            (Some(self.encode_utc_time()), None)
        }
    }
}


//--- Deref and AsRef

impl ops::Deref for Time {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<DateTime<Utc>> for Time {
    fn as_ref(&self) -> &DateTime<Utc> {
        &self.0
    }
}


//--- From and FromStr

impl From<DateTime<Utc>> for Time {
    fn from(time: DateTime<Utc>) -> Self {
        Time(time)
    }
}

impl From<Time> for DateTime<Utc> {
    fn from(time: Time) -> Self {
        time.0
    }
}

impl From<SystemTime> for Time {
    fn from(time: SystemTime) -> Self {
        Time(time.into())
    }
}

impl FromStr for Time {
    type Err = chrono::format::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FromStr::from_str(s).map(Time)
    }
}


//--- Add and Sub

impl ops::Add<TimeDelta> for Time {
    type Output = Self;

    fn add(self, duration: TimeDelta) -> Self::Output {
        Self::new(self.0 + duration)
    }
}

impl Time {
    /// The latest representable time.
    pub const MAX: Time = Time(DateTime::<Utc>::MAX_UTC);

    /// Adds a duration, returning `None` if the result can’t be represented.
    pub fn checked_add(self, duration: TimeDelta) -> Option<Self> {
        self.0.checked_add_signed(duration).map(Self::new)
    }

    /// Adds a duration, stopping at [`Time::MAX`].
    pub fn saturating_add(self, duration: TimeDelta) -> Self {
        self.checked_add(duration).unwrap_or(Self::MAX)
    }
}

impl ops::Sub<TimeDelta> for Time {
    type Output = Self;

    fn sub(self, duration: TimeDelta) -> Self::Output {
        Self::new(self.0 - duration)
    }
}

impl ops::Sub<Time> for Time {
    type Output = TimeDelta;

    fn sub(self, other: Time) -> Self::Output {
        self.0 - other.0
    }
}


//--- Display

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%SZ"))
    }
}


fn read_two_char<S: decode::Source>(
    source: &mut S
) -> Result<u32, DecodeError<S::Error>> {
    let mut s = [0u8; 2];
    s[0] = source.take_u8()?;
    s[1] = source.take_u8()?;
    read_digits(&s).ok_or_else(|| source.content_err("malformed time value"))
}

fn read_four_char<S: decode::Source>(
    source: &mut S
) -> Result<u32, DecodeError<S::Error>> {
    let mut s = [0u8; 4];
    for ch in &mut s {
        *ch = source.take_u8()?;
    }
    read_digits(&s).ok_or_else(|| source.content_err("malformed time value"))
}

fn read_digits(s: &[u8]) -> Option<u32> {
    if !s.iter().all(u8::is_ascii_digit) {
        return None
    }
    str::from_utf8(s).ok()?.parse().ok()
}


//------------ UtcTime -------------------------------------------------------

pub struct UtcTime(Time);

impl PrimitiveContent for UtcTime {
    const TAG: Tag = Tag::UTC_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        13 // yyMMddhhmmssZ
    }

    fn write_encoded<W: io::Write>(
        &self, _: Mode, target: &mut W
    ) -> Result<(), io::Error> {
        write!(
            target, "{:02}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year() % 100, self.0.month(), self.0.day(),
            self.0.hour(), self.0.minute(), self.0.second()
        )
    }
}


//------------ GeneralizedTime -----------------------------------------------

pub struct GeneralizedTime(Time);

impl PrimitiveContent for GeneralizedTime {
    const TAG: Tag = Tag::GENERALIZED_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        15 // yyyyMMddhhmmssZ
    }

    fn write_encoded<W: io::Write>(
        &self, _: Mode, target: &mut W
    ) -> Result<(), io::Error> {
        write!(
            target, "{:04}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year(), self.0.month(), self.0.day(),
            self.0.hour(), self.0.minute(), self.0.second()
        )
    }
}


//------------ Validity ------------------------------------------------------

#[derive(
    Clone, Debug, Copy, Eq, Hash, PartialEq,
    serde::Serialize, serde::Deserialize
)]
pub struct Validity {
    not_before: Time,
    not_after: Time,
}

impl Validity {
    pub fn new(not_before: Time, not_after: Time) -> Self {
        Validity { not_before, not_after }
    }

    /// Creates a validity starting now and lasting for the given duration.
    ///
    /// Certificates encode time with second precision only, so the start
    /// is truncated to the full second.
    pub fn from_duration(duration: TimeDelta) -> Self {
        let now = Time::now();
        let now = Time::from_timestamp(now.timestamp()).unwrap_or(now);
        let then = now + duration;
        if now < then {
            Validity::new(now, then)
        }
        else {
            Validity::new(then, now)
        }
    }

    pub fn not_before(self) -> Time {
        self.not_before
    }

    pub fn not_after(self) -> Time {
        self.not_after
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            Ok(Validity::new(
                Time::take_from(cons)?,
                Time::take_from(cons)?,
            ))
        })
    }

    /// Checks that `now` lies within the validity period.
    pub fn verify_at(self, now: Time) -> Result<(), ValidityPeriodError> {
        self.not_before.verify_not_before(now)?;
        self.not_after.verify_not_after(now)?;
        Ok(())
    }

    pub fn encode(self) -> impl encode::Values {
        encode::sequence((
            self.not_before.encode_varied(),
            self.not_after.encode_varied(),
        ))
    }
}


//------------ SerialSliceError ----------------------------------------------

/// A serial number is longer than 20 octets.
#[derive(Clone, Copy, Debug)]
pub struct SerialSliceError;

impl From<SerialSliceError> for ContentError {
    fn from(_: SerialSliceError) -> Self {
        ContentError::from_static("serial number longer than 20 bytes")
    }
}

impl fmt::Display for SerialSliceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("serial number longer than 20 bytes")
    }
}

impl error::Error for SerialSliceError { }


//------------ ValidityPeriodError -------------------------------------------

/// An object is outside of its period of validity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValidityPeriodError {
    /// Is the object too new?
    ///
    /// It is too old otherwise.
    too_new: bool,
}

impl ValidityPeriodError {
    fn too_new() -> Self {
        ValidityPeriodError { too_new: true }
    }

    fn too_old() -> Self {
        ValidityPeriodError { too_new: false }
    }

    /// Returns whether the object is not yet valid.
    pub fn is_too_new(self) -> bool {
        self.too_new
    }
}

impl fmt::Display for ValidityPeriodError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(
            if self.too_new {
                "object is not yet valid"
            }
            else {
                "object has expired"
            }
        )
    }
}

impl error::Error for ValidityPeriodError { }


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use bcder::decode::Constructed;
    use bcder::encode::Values;
    use crate::oid;

    #[test]
    fn name_attributes() {
        let name = Name::from_attributes(&[
            (&oid::AT_COUNTRY_NAME, "FI"),
            (&oid::AT_COMMON_NAME, "Aboa Mare"),
            (&oid::AT_UID, "urn:mrn:mcp:id:aboamare"),
        ]);
        let encoded = name.encode_ref().to_captured(Mode::Der);
        let decoded = Mode::Der.decode(
            encoded.as_slice(), Name::take_from
        ).unwrap();
        assert_eq!(decoded, name);

        let attrs = decoded.attributes().unwrap();
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[0].0, oid::AT_COUNTRY_NAME);
        assert_eq!(attrs[0].1, "FI");
        assert_eq!(
            decoded.attribute(&oid::AT_UID).as_deref(),
            Some("urn:mrn:mcp:id:aboamare")
        );
        assert_eq!(decoded.attribute(&oid::AT_EMAIL_ADDRESS), None);
    }

    #[test]
    fn serial_from_slice() {
        assert_eq!(
            Serial::from_slice(b"\x00\x01\x02\x03").unwrap().as_slice(),
            b"\x01\x02\x03"
        );
        assert_eq!(Serial::from(0x10203u128).to_string(), "010203");
        assert_eq!(Serial::from(0x80u128).0.as_ref(), b"\x00\x80");
        assert_eq!(Serial::from(0u128).0.as_ref(), b"\x00");
        assert!(Serial::from_slice(&[1u8; 21]).is_err());
    }

    #[test]
    fn serial_take_from() {
        assert_eq!(
            Constructed::decode(
                b"\x02\x03\x01\x02\x03".as_ref(),
                Mode::Der,
                Serial::take_from
            ).unwrap(),
            Serial::from(0x10203u128)
        );
    }

    #[test]
    fn serial_random() {
        let serial = Serial::random().unwrap();
        assert_eq!(serial.as_slice().len(), 16);
        assert_eq!(serial.as_slice()[0] & 0x80, 0);
    }

    #[test]
    fn time_round_trip() {
        let time = Time::utc(2023, 9, 1, 12, 30, 5).unwrap();
        let encoded = time.encode_varied().to_captured(Mode::Der);
        assert_eq!(encoded.as_slice(), b"\x17\x0d230901123005Z");
        assert_eq!(
            Mode::Der.decode(encoded.as_slice(), Time::take_from).unwrap(),
            time
        );

        let time = Time::utc(2051, 1, 1, 0, 0, 0).unwrap();
        let encoded = time.encode_varied().to_captured(Mode::Der);
        assert_eq!(encoded.as_slice(), b"\x18\x0f20510101000000Z");
        assert_eq!(
            Mode::Der.decode(encoded.as_slice(), Time::take_from).unwrap(),
            time
        );
    }

    #[test]
    fn time_rejects_garbage() {
        assert!(
            Mode::Der.decode(
                b"\x17\x0d23+901123005Z".as_ref(), Time::take_from
            ).is_err()
        );
        assert!(
            Mode::Der.decode(
                b"\x17\x0d231301123005Z".as_ref(), Time::take_from
            ).is_err()
        );
    }

    #[test]
    fn time_checked_add() {
        let time = Time::utc(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            time.checked_add(TimeDelta::days(1)),
            Time::utc(2025, 1, 2, 0, 0, 0)
        );
        assert_eq!(time.checked_add(TimeDelta::weeks(100_000_000)), None);
        assert_eq!(
            time.saturating_add(TimeDelta::weeks(100_000_000)), Time::MAX
        );
    }

    #[test]
    fn validity_verify() {
        let validity = Validity::new(
            Time::utc(2020, 1, 1, 0, 0, 0).unwrap(),
            Time::utc(2030, 1, 1, 0, 0, 0).unwrap(),
        );
        assert!(
            validity.verify_at(Time::utc(2025, 1, 1, 0, 0, 0).unwrap()).is_ok()
        );
        assert!(
            validity.verify_at(
                Time::utc(2019, 1, 1, 0, 0, 0).unwrap()
            ).unwrap_err().is_too_new()
        );
        assert!(
            !validity.verify_at(
                Time::utc(2031, 1, 1, 0, 0, 0).unwrap()
            ).unwrap_err().is_too_new()
        );
    }
}
