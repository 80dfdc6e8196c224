/// Driver-side values
///
/// `DbValue` is what crosses the `Session` boundary. A database NULL is never a
/// `DbValue`; it is the `None` of an `Option<DbValue>`.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Text(String),
    Ascii(String),
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Varint(Varint),
    Blob(Vec<u8>),
    Inet(IpAddr),
    /// Milliseconds since the Unix epoch
    Timestamp(i64),
    /// Nanoseconds since midnight
    Time(i64),
    Uuid(Uuid),
    TimeUuid(Uuid),
    List(Vec<DbValue>),
    Set(Vec<DbValue>),
    Map(Vec<(DbValue, DbValue)>),
}

impl DbValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DbValue::Text(s) | DbValue::Ascii(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DbValue::Text(_) => "text",
            DbValue::Ascii(_) => "ascii",
            DbValue::Boolean(_) => "boolean",
            DbValue::TinyInt(_) => "tinyint",
            DbValue::SmallInt(_) => "smallint",
            DbValue::Int(_) => "int",
            DbValue::BigInt(_) => "bigint",
            DbValue::Float(_) => "float",
            DbValue::Double(_) => "double",
            DbValue::Decimal(_) => "decimal",
            DbValue::Varint(_) => "varint",
            DbValue::Blob(_) => "blob",
            DbValue::Inet(_) => "inet",
            DbValue::Timestamp(_) => "timestamp",
            DbValue::Time(_) => "time",
            DbValue::Uuid(_) => "uuid",
            DbValue::TimeUuid(_) => "timeuuid",
            DbValue::List(_) => "list",
            DbValue::Set(_) => "set",
            DbValue::Map(_) => "map",
        }
    }
}

/// Arbitrary-precision integer kept as canonical decimal digits
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Varint {
    negative: bool,
    digits: String,
}

impl Varint {
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Magnitude as decimal digits without sign or leading zeros
    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn from_parts(negative: bool, digits: &str) -> Option<Self> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let trimmed = digits.trim_start_matches('0');
        let digits = if trimmed.is_empty() { "0" } else { trimmed };
        Some(Self {
            negative: negative && digits != "0",
            digits: digits.to_string(),
        })
    }
}

impl Varint {
    /// Minimal big-endian two's complement encoding, as the native protocol carries it
    pub fn to_signed_bytes_be(&self) -> Vec<u8> {
        // Magnitude in base 256, most significant byte first
        let mut decimal: Vec<u32> = self.digits.bytes().map(|b| u32::from(b - b'0')).collect();
        let mut magnitude = Vec::new();
        while !(decimal.is_empty() || decimal.iter().all(|d| *d == 0)) {
            let mut remainder = 0u32;
            let mut quotient = Vec::with_capacity(decimal.len());
            for digit in &decimal {
                let current = remainder * 10 + digit;
                let q = current / 256;
                remainder = current % 256;
                if !quotient.is_empty() || q != 0 {
                    quotient.push(q);
                }
            }
            magnitude.push(remainder as u8);
            decimal = quotient;
        }
        magnitude.push(0);
        magnitude.reverse();

        if self.negative {
            for byte in magnitude.iter_mut() {
                *byte = !*byte;
            }
            for byte in magnitude.iter_mut().rev() {
                let (sum, overflow) = byte.overflowing_add(1);
                *byte = sum;
                if !overflow {
                    break;
                }
            }
        }

        let filler = if self.negative { 0xFF } else { 0x00 };
        let mut start = 0;
        while start + 1 < magnitude.len()
            && magnitude[start] == filler
            && (magnitude[start + 1] & 0x80 == 0x80) == self.negative
        {
            start += 1;
        }
        magnitude.split_off(start)
    }

    pub fn from_signed_bytes_be(bytes: &[u8]) -> Self {
        let negative = bytes.first().map_or(false, |b| b & 0x80 != 0);
        let mut magnitude = bytes.to_vec();
        if negative {
            for byte in magnitude.iter_mut() {
                *byte = !*byte;
            }
            for byte in magnitude.iter_mut().rev() {
                let (sum, overflow) = byte.overflowing_add(1);
                *byte = sum;
                if !overflow {
                    break;
                }
            }
        }

        // Decimal digits, least significant first
        let mut decimal: Vec<u32> = vec![0];
        for byte in magnitude {
            let mut carry = u32::from(byte);
            for digit in decimal.iter_mut() {
                let current = *digit * 256 + carry;
                *digit = current % 10;
                carry = current / 10;
            }
            while carry > 0 {
                decimal.push(carry % 10);
                carry /= 10;
            }
        }
        let digits: String = decimal
            .iter()
            .rev()
            .map(|d| char::from(b'0' + *d as u8))
            .collect();

        let trimmed = digits.trim_start_matches('0');
        let digits = if trimmed.is_empty() { "0" } else { trimmed };
        Self {
            negative: negative && digits != "0",
            digits: digits.to_string(),
        }
    }
}

impl FromStr for Varint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, digits) = split_sign(s.trim());
        Varint::from_parts(negative, digits).ok_or_else(|| format!("'{}' is not an integer", s))
    }
}

impl fmt::Display for Varint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        f.write_str(&self.digits)
    }
}

/// Largest scale magnitude accepted from text and rendered in plain notation
pub const MAX_DECIMAL_SCALE: u32 = 10_000;

/// Arbitrary-precision decimal: `unscaled * 10^-scale`
///
/// The scale is preserved, so `1.50` and `1.5` are different values, as they are
/// in the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    unscaled: Varint,
    scale: i32,
}

impl Decimal {
    pub fn new(unscaled: Varint, scale: i32) -> Self {
        Self { unscaled, scale }
    }

    pub fn unscaled(&self) -> &Varint {
        &self.unscaled
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }
}

impl FromStr for Decimal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("'{}' is not a decimal number", s);
        let (negative, rest) = split_sign(s.trim());

        let (mantissa, exponent) = match rest.find(|c| c == 'e' || c == 'E') {
            Some(idx) => {
                let exponent: i32 = rest[idx + 1..].parse().map_err(|_| invalid())?;
                (&rest[..idx], exponent)
            }
            None => (rest, 0),
        };

        let (integer, fraction) = match mantissa.split_once('.') {
            Some((integer, fraction)) => (integer, fraction),
            None => (mantissa, ""),
        };
        if integer.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        let digits = format!("{}{}", integer, fraction);
        let unscaled = Varint::from_parts(negative, &digits).ok_or_else(invalid)?;
        let scale = i32::try_from(fraction.len())
            .ok()
            .and_then(|len| len.checked_sub(exponent))
            .ok_or_else(invalid)?;
        if scale.unsigned_abs() > MAX_DECIMAL_SCALE {
            return Err(format!("'{}' exceeds the supported decimal scale of {}", s, MAX_DECIMAL_SCALE));
        }

        Ok(Decimal { unscaled, scale })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unscaled.negative {
            f.write_str("-")?;
        }
        let digits = self.unscaled.digits.as_str();

        // Scales read from the database are unbounded; render those in exponent form
        if self.scale.unsigned_abs() > MAX_DECIMAL_SCALE {
            return write!(f, "{}E{}", digits, -i64::from(self.scale));
        }

        if self.scale <= 0 {
            f.write_str(digits)?;
            if digits != "0" {
                for _ in 0..self.scale.unsigned_abs() {
                    f.write_str("0")?;
                }
            }
            return Ok(());
        }

        let scale = self.scale as usize;
        if digits.len() > scale {
            let (integer, fraction) = digits.split_at(digits.len() - scale);
            write!(f, "{}.{}", integer, fraction)
        } else {
            write!(f, "0.{}{}", "0".repeat(scale - digits.len()), digits)
        }
    }
}

fn split_sign(s: &str) -> (bool, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_parsing() {
        let v: Varint = "-000123".parse().unwrap();
        assert!(v.is_negative());
        assert_eq!(v.to_string(), "-123");
        assert_eq!("-0".parse::<Varint>().unwrap().to_string(), "0");
        assert_eq!(
            "123456789012345678901234567890".parse::<Varint>().unwrap().to_string(),
            "123456789012345678901234567890"
        );
        assert!("12a".parse::<Varint>().is_err());
        assert!("".parse::<Varint>().is_err());
        assert!("1.5".parse::<Varint>().is_err());
    }

    #[test]
    fn test_varint_twos_complement() {
        let cases: [(&str, &[u8]); 7] = [
            ("0", &[0x00]),
            ("127", &[0x7F]),
            ("128", &[0x00, 0x80]),
            ("-1", &[0xFF]),
            ("-128", &[0x80]),
            ("-129", &[0xFF, 0x7F]),
            ("65536", &[0x01, 0x00, 0x00]),
        ];
        for (text, bytes) in cases {
            let v: Varint = text.parse().unwrap();
            assert_eq!(v.to_signed_bytes_be(), bytes, "{}", text);
            assert_eq!(Varint::from_signed_bytes_be(bytes), v, "{}", text);
        }
        assert_eq!(Varint::from_signed_bytes_be(&[]).to_string(), "0");
    }

    #[test]
    fn test_decimal_parsing_keeps_scale() {
        let d: Decimal = "1.25".parse().unwrap();
        assert_eq!(d.unscaled().to_string(), "125");
        assert_eq!(d.scale(), 2);
        assert_eq!(d.to_string(), "1.25");

        assert_eq!("1.50".parse::<Decimal>().unwrap().to_string(), "1.50");
        assert_ne!("1.50".parse::<Decimal>().unwrap(), "1.5".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_decimal_small_and_negative() {
        assert_eq!("-0.0125".parse::<Decimal>().unwrap().to_string(), "-0.0125");
        assert_eq!(".5".parse::<Decimal>().unwrap().to_string(), "0.5");
        assert_eq!("42".parse::<Decimal>().unwrap().scale(), 0);
    }

    #[test]
    fn test_decimal_exponent() {
        let d: Decimal = "1.5e3".parse().unwrap();
        assert_eq!(d.scale(), -2);
        assert_eq!(d.to_string(), "1500");

        let d: Decimal = "15E-3".parse().unwrap();
        assert_eq!(d.to_string(), "0.015");
    }

    #[test]
    fn test_decimal_rejects_garbage() {
        assert!("abc".parse::<Decimal>().is_err());
        assert!(".".parse::<Decimal>().is_err());
        assert!("1e".parse::<Decimal>().is_err());
        assert!("1.2.3".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_decimal_scale_is_bounded() {
        assert!("1e2000000000".parse::<Decimal>().is_err());
        assert!("1e-10001".parse::<Decimal>().is_err());
        assert_eq!("1e10000".parse::<Decimal>().unwrap().scale(), -10_000);

        let unscaled: Varint = "12".parse().unwrap();
        assert_eq!(Decimal::new(unscaled.clone(), -2_000_000_000).to_string(), "12E2000000000");
        assert_eq!(Decimal::new(unscaled, 20_000).to_string(), "12E-20000");
    }

    #[test]
    fn test_db_value_text_accessor() {
        assert_eq!(DbValue::Text("a".into()).as_text(), Some("a"));
        assert_eq!(DbValue::Ascii("b".into()).as_text(), Some("b"));
        assert_eq!(DbValue::Int(1).as_text(), None);
    }
}
