//! Maritime Resource Names.
//!
//! Identities in the Maritime Connectivity Platform are URNs of the form
//! `urn:mrn:mcp:id:<segment>[:<segment>...]`. The hierarchy is positional:
//! the MRN of an entity is prefixed by the MRN of the registry that issued
//! it. A registry `urn:mrn:mcp:id:mir` thus issues, e.g.,
//! `urn:mrn:mcp:id:mir:vessel`.

use std::{error, fmt, hash, str};
use std::convert::TryFrom;


//------------ Mrn -----------------------------------------------------------

/// A valid MCP identity MRN.
///
/// The value is kept as given. Comparison and hashing are ASCII case
/// insensitive.
#[derive(Clone, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mrn(String);

impl Mrn {
    /// The prefix all MCP identity MRNs start with.
    pub const PREFIX: &'static str = "urn:mrn:mcp:id";

    /// Parses a string into an MRN.
    pub fn parse(value: &str) -> Result<Self, MrnError> {
        if Self::check(value) {
            Ok(Mrn(value.into()))
        }
        else {
            Err(MrnError::new(value))
        }
    }

    /// Returns whether a string is a valid MRN.
    pub fn check(value: &str) -> bool {
        let rest = match value.get(..Self::PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(Self::PREFIX) => {
                &value[Self::PREFIX.len()..]
            }
            _ => return false
        };
        let rest = match rest.strip_prefix(':') {
            Some(rest) => rest,
            None => return false
        };
        rest.split(':').all(|segment| {
            !segment.is_empty() && segment.bytes().all(|ch| {
                ch.is_ascii_alphanumeric()
                    || ch == b'.' || ch == b'_' || ch == b'-'
            })
        })
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the MRN of the issuer.
    ///
    /// This is the MRN with the last segment removed. Fails if that isn’t
    /// an MRN anymore, i.e., for `urn:mrn:mcp:id:<segment>`.
    pub fn issuer(&self) -> Result<Mrn, MrnError> {
        match self.0.rfind(':') {
            Some(pos) => Self::parse(&self.0[..pos]),
            None => Err(MrnError::new(&self.0))
        }
    }

    /// Returns whether the MRN was issued by the given issuer.
    pub fn issued_by(&self, candidate: impl AsRef<str>) -> bool {
        match self.issuer() {
            Ok(issuer) => {
                issuer.0.eq_ignore_ascii_case(candidate.as_ref())
            }
            Err(_) => false
        }
    }

    /// Returns the segments after the common prefix.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[Self::PREFIX.len() + 1..].split(':')
    }
}


//--- FromStr and TryFrom

impl str::FromStr for Mrn {
    type Err = MrnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Mrn {
    type Error = MrnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if Self::check(&value) {
            Ok(Mrn(value))
        }
        else {
            Err(MrnError(value))
        }
    }
}

impl TryFrom<&str> for Mrn {
    type Error = MrnError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Mrn> for String {
    fn from(mrn: Mrn) -> Self {
        mrn.0
    }
}


//--- AsRef

impl AsRef<str> for Mrn {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}


//--- PartialEq, Eq, and Hash

impl PartialEq for Mrn {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Mrn { }

impl PartialEq<str> for Mrn {
    fn eq(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for Mrn {
    fn eq(&self, other: &&str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl hash::Hash for Mrn {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        for ch in self.0.bytes() {
            state.write_u8(ch.to_ascii_lowercase())
        }
        state.write_u8(0xff)
    }
}


//--- Display and Debug

impl fmt::Display for Mrn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Mrn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Mrn({})", self.0)
    }
}


//------------ MrnError ------------------------------------------------------

/// A string is not a valid MCP MRN.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MrnError(String);

impl MrnError {
    fn new(value: &str) -> Self {
        MrnError(value.into())
    }

    /// Returns the offending value.
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MrnError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} is not a valid MCP MIR MRN", self.0)
    }
}

impl error::Error for MrnError { }


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parse_valid() {
        for value in [
            "urn:mrn:mcp:id:mir",
            "urn:mrn:mcp:id:mir:vessel",
            "urn:mrn:mcp:id:aivn:vessel:imo-1234567",
            "URN:MRN:MCP:ID:Mir:Some_Thing.v2",
        ] {
            let mrn = Mrn::parse(value).unwrap();
            assert_eq!(mrn.as_str(), value);
        }
    }

    #[test]
    fn parse_invalid() {
        for value in [
            "",
            "urn:mrn:mcp:id",
            "urn:mrn:mcp:id:",
            "urn:mrn:mcp:id::mir",
            "urn:mrn:mcp:id:mir:",
            "urn:mrn:mcp:mir",
            "urn:mrn:iala:id:mir",
            "urn:mrn:mcp:id:mir vessel",
            "urn:mrn:mcp:id:mir/vessel",
            "urn:mrn:mcp:idmir",
        ] {
            assert!(Mrn::parse(value).is_err(), "{}", value);
        }
    }

    #[test]
    fn issuer() {
        let mrn = Mrn::parse("urn:mrn:mcp:id:mir:org:vessel").unwrap();
        assert_eq!(
            mrn.issuer().unwrap().as_str(), "urn:mrn:mcp:id:mir:org"
        );
        assert_eq!(
            mrn.issuer().unwrap().issuer().unwrap().as_str(),
            "urn:mrn:mcp:id:mir"
        );
        assert!(Mrn::parse("urn:mrn:mcp:id:mir").unwrap().issuer().is_err());
    }

    #[test]
    fn issued_by() {
        let mrn = Mrn::parse("urn:mrn:mcp:id:mir:vessel").unwrap();
        assert!(mrn.issued_by("urn:mrn:mcp:id:mir"));
        assert!(mrn.issued_by("urn:mrn:mcp:id:MIR"));
        assert!(mrn.issued_by(Mrn::parse("urn:mrn:mcp:id:mir").unwrap()));
        assert!(!mrn.issued_by("urn:mrn:mcp:id:other"));
        assert!(!mrn.issued_by("urn:mrn:mcp:id:mir:vessel"));
        assert!(
            !Mrn::parse("urn:mrn:mcp:id:mir").unwrap().issued_by(
                "urn:mrn:mcp:id"
            )
        );
    }

    #[test]
    fn case_insensitive_equality() {
        let one = Mrn::parse("urn:mrn:mcp:id:Mir").unwrap();
        let two = Mrn::parse("urn:mrn:mcp:id:mir").unwrap();
        assert_eq!(one, two);
        assert_eq!(one, "URN:MRN:MCP:ID:MIR");
        let set: HashSet<_> = [one, two].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn segments() {
        let mrn = Mrn::parse("urn:mrn:mcp:id:mir:vessel").unwrap();
        assert_eq!(mrn.segments().collect::<Vec<_>>(), ["mir", "vessel"]);
    }

    #[test]
    fn serde() {
        let mrn: Mrn = serde_json::from_str(
            "\"urn:mrn:mcp:id:mir\""
        ).unwrap();
        assert_eq!(mrn.as_str(), "urn:mrn:mcp:id:mir");
        assert_eq!(
            serde_json::to_string(&mrn).unwrap(), "\"urn:mrn:mcp:id:mir\""
        );
        assert!(serde_json::from_str::<Mrn>("\"urn:foo\"").is_err());
    }
}
