//! Keys and values as handed back to callers.

use crate::options::DataFormat;
use std::borrow::Cow;
use std::fmt;

/// A key or value read from the store, either decoded text or raw bytes.
///
/// Which variant a read produces is chosen by [`DataFormat`]; text is the
/// default. Comparisons against `&str` and `&[u8]` look at the underlying
/// bytes, so tests and callers can compare without caring which form they got.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Datum {
    /// UTF-8 text (lossily decoded)
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl Datum {
    /// Builds a datum from raw bytes in the requested format.
    pub fn decode(bytes: Vec<u8>, format: DataFormat) -> Self {
        match format {
            DataFormat::Buffer => Datum::Bytes(bytes),
            DataFormat::Text => match String::from_utf8(bytes) {
                Ok(text) => Datum::Text(text),
                Err(e) => Datum::Text(String::from_utf8_lossy(e.as_bytes()).into_owned()),
            },
        }
    }

    /// The underlying bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Datum::Text(s) => s.as_bytes(),
            Datum::Bytes(b) => b,
        }
    }

    /// The text form, if this datum was decoded as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            Datum::Bytes(_) => None,
        }
    }

    /// A text view regardless of variant
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Datum::Text(s) => Cow::Borrowed(s),
            Datum::Bytes(b) => String::from_utf8_lossy(b),
        }
    }

    /// Consumes the datum, yielding its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Datum::Text(s) => s.into_bytes(),
            Datum::Bytes(b) => b,
        }
    }

    /// Returns true if this datum holds raw bytes
    pub fn is_bytes(&self) -> bool {
        matches!(self, Datum::Bytes(_))
    }
}

impl AsRef<[u8]> for Datum {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl PartialEq<str> for Datum {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for Datum {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<[u8]> for Datum {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for Datum {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl<const N: usize> PartialEq<&[u8; N]> for Datum {
    fn eq(&self, other: &&[u8; N]) -> bool {
        self.as_bytes() == &other[..]
    }
}

impl PartialEq<Vec<u8>> for Datum {
    fn eq(&self, other: &Vec<u8>) -> bool {
        self.as_bytes() == other.as_slice()
    }
}

impl From<Datum> for Vec<u8> {
    fn from(datum: Datum) -> Self {
        datum.into_bytes()
    }
}
