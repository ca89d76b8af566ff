use core::fmt::{self, Debug, Display};
use core::str::FromStr;

use nom::{IResult, Parser, number::complete::u8};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

/// An OBIS code.
///
/// Parsed from the dotted six-group notation used by meter vendors
/// (`"0.0.96.1.0.255"`), displayed in the IEC 62056-61 form (`0-0:96.1.0*255`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObisCode {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: u8,
}

impl ObisCode {
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (a, b, c, d, e, f)) = (u8, u8, u8, u8, u8, u8).parse(input)?;
        Ok((input, Self::new(a, b, c, d, e, f)))
    }

    pub fn encode(&self) -> [u8; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// Dotted form, as used in XML renderings and log lines.
    pub fn dotted(&self) -> String {
        format!("{}.{}.{}.{}.{}.{}", self.a, self.b, self.c, self.d, self.e, self.f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid OBIS code {0:?}, expected six dot separated values in 0..=255")]
pub struct InvalidObisCode(pub String);

impl FromStr for ObisCode {
    type Err = InvalidObisCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups = s
            .split('.')
            .map(|group| group.trim().parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| InvalidObisCode(s.to_owned()))?;

        match groups[..] {
            [a, b, c, d, e, f] => Ok(Self::new(a, b, c, d, e, f)),
            _ => Err(InvalidObisCode(s.to_owned())),
        }
    }
}

impl Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}:{}.{}.{}*{}", self.a, self.b, self.c, self.d, self.e, self.f)
    }
}

impl Debug for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObisCode({})", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for ObisCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.dotted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_remaining() {
        let input = [0, 0, 96, 1, 0, 255, 0x02, 0x00];
        let (remaining, code) = ObisCode::parse(&input).unwrap();

        assert_eq!(remaining, &[0x02, 0x00]);
        assert_eq!(code, ObisCode::new(0, 0, 96, 1, 0, 255));
    }

    #[test]
    fn test_parse_insufficient_input() {
        assert!(ObisCode::parse(&[1, 2, 3, 4, 5]).is_err());
    }

    #[test]
    fn test_from_str_dotted() {
        let code: ObisCode = "0.105.25.9.0.255".parse().unwrap();

        assert_eq!(code, ObisCode::new(0, 105, 25, 9, 0, 255));
        assert_eq!(code.dotted(), "0.105.25.9.0.255");
        assert_eq!(code.encode(), [0, 105, 25, 9, 0, 255]);
    }

    #[test]
    fn test_from_str_rejects_malformed() {
        assert!("0.0.96.1.0".parse::<ObisCode>().is_err());
        assert!("0.0.96.1.0.256".parse::<ObisCode>().is_err());
        assert!("0.0.96.1.0.255.1".parse::<ObisCode>().is_err());
        assert!("a.b.c.d.e.f".parse::<ObisCode>().is_err());
    }

    #[test]
    fn test_display_format() {
        let code = ObisCode::new(1, 0, 99, 1, 0, 255);

        assert_eq!(code.to_string(), "1-0:99.1.0*255");
        assert_eq!(format!("{:?}", code), "ObisCode(1-0:99.1.0*255)");
    }

    #[test]
    fn test_ordering() {
        let code1 = ObisCode::new(0, 0, 99, 98, 0, 255);
        let code2 = ObisCode::new(0, 0, 99, 98, 1, 255);

        assert!(code1 < code2);
    }
}
