//! Storage quantities
//!
//! Exact arithmetic over Kubernetes quantity strings (`10Gi`, `500M`, `1e9`).
//! Values are held as `BigDecimal` so repeated summation never drifts, and
//! each quantity remembers which suffix family it was written in.

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, Zero};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as KubeQuantity;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Suffix family a quantity was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityFormat {
    /// Ki, Mi, Gi, Ti, Pi, Ei
    BinarySi,
    /// n, u, m, k, M, G, T, P, E
    DecimalSi,
    /// e<n> / E<n>
    DecimalExponent,
}

impl QuantityFormat {
    /// Decimal SI and exponent notation are both base ten and add freely
    fn is_binary(self) -> bool {
        self == QuantityFormat::BinarySi
    }
}

impl std::fmt::Display for QuantityFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantityFormat::BinarySi => write!(f, "binary-si"),
            QuantityFormat::DecimalSi => write!(f, "decimal-si"),
            QuantityFormat::DecimalExponent => write!(f, "decimal-exponent"),
        }
    }
}

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 1),
    ("Mi", 2),
    ("Gi", 3),
    ("Ti", 4),
    ("Pi", 5),
    ("Ei", 6),
];

const DECIMAL_SUFFIXES: [(&str, i64); 9] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// Largest decimal exponent accepted in `e<n>` notation
///
/// Anything beyond this is far outside any real storage size and would make
/// every sum and render materialise the full power of ten.
pub const MAX_EXPONENT: i32 = 64;

fn pow10(exp: i64) -> BigDecimal {
    BigDecimal::new(BigInt::from(1), -exp)
}

fn pow1024(exp: u32) -> BigDecimal {
    BigDecimal::from(BigInt::from(1024u32).pow(exp))
}

fn is_integer(value: &BigDecimal) -> bool {
    value.with_scale(0) == *value
}

/// An exact storage quantity
///
/// A quantity written without a suffix has no format of its own and takes
/// on the format of whatever it is added to.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    value: BigDecimal,
    format: Option<QuantityFormat>,
}

impl Default for Quantity {
    fn default() -> Self {
        Self::zero()
    }
}

impl Quantity {
    pub fn zero() -> Self {
        Self {
            value: BigDecimal::zero(),
            format: None,
        }
    }

    pub fn value(&self) -> &BigDecimal {
        &self.value
    }

    pub fn format(&self) -> Option<QuantityFormat> {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Parse a quantity string
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        let invalid = |reason: &str| Error::CapacityParse(format!("{:?}: {}", input, reason));

        let (negative, rest) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            Some(_) => (false, s),
            None => return Err(invalid("empty quantity")),
        };

        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (num_str, suffix) = rest.split_at(num_end);

        if num_str.is_empty() || num_str == "." || num_str.matches('.').count() > 1 {
            return Err(invalid("invalid number"));
        }

        let (multiplier, format) = Self::parse_suffix(suffix).map_err(invalid)?;
        let number = BigDecimal::from_str(num_str).map_err(|_| invalid("invalid number"))?;

        let mut value = number * multiplier;
        if negative {
            value = -value;
        }

        Ok(Self { value, format })
    }

    fn parse_suffix(
        suffix: &str,
    ) -> std::result::Result<(BigDecimal, Option<QuantityFormat>), &'static str> {
        if suffix.is_empty() {
            return Ok((BigDecimal::from(1), None));
        }
        if let Some((_, exp)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
            return Ok((pow1024(*exp), Some(QuantityFormat::BinarySi)));
        }
        if let Some((_, exp)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
            return Ok((pow10(*exp), Some(QuantityFormat::DecimalSi)));
        }
        if let Some(exp) = suffix.strip_prefix(['e', 'E']) {
            let exp: i32 = exp.parse().map_err(|_| "invalid exponent")?;
            if !(-MAX_EXPONENT..=MAX_EXPONENT).contains(&exp) {
                return Err("exponent out of range");
            }
            return Ok((pow10(i64::from(exp)), Some(QuantityFormat::DecimalExponent)));
        }
        Err("unknown suffix")
    }

    /// Exact sum; binary and decimal quantities do not mix
    ///
    /// The result keeps the left operand's format when it has one.
    pub fn checked_add(&self, other: &Quantity) -> Result<Quantity> {
        let format = match (self.format, other.format) {
            (Some(a), Some(b)) if a.is_binary() != b.is_binary() => {
                return Err(Error::CapacityUnitMismatch {
                    left: format!("{} ({})", self, a),
                    right: format!("{} ({})", other, b),
                })
            }
            (a, b) => a.or(b),
        };

        Ok(Quantity {
            value: self.value.clone() + other.value.clone(),
            format,
        })
    }

    fn render_decimal(&self) -> String {
        for exp in [18i64, 15, 12, 9, 6, 3, 0, -3, -6, -9] {
            let mantissa = self.value.clone() * pow10(-exp);
            if !is_integer(&mantissa) {
                continue;
            }
            let suffix = DECIMAL_SUFFIXES
                .iter()
                .find(|(_, e)| *e == exp)
                .map(|(s, _)| *s)
                .unwrap_or_default();
            return format!("{}{}", mantissa.with_scale(0), suffix);
        }
        self.value.normalized().to_string()
    }

    /// `<mantissa>e<exp>` with the exponent the largest multiple of three
    /// that leaves an integer mantissa
    fn render_exponent(&self) -> String {
        let (digits, scale) = self.value.normalized().as_bigint_and_exponent();
        let trailing = -scale;
        let exp = trailing.div_euclid(3) * 3;
        let mantissa = digits * BigInt::from(10u32).pow((trailing - exp) as u32);
        if exp == 0 {
            mantissa.to_string()
        } else {
            format!("{}e{}", mantissa, exp)
        }
    }

    fn render_binary(&self) -> Option<String> {
        if !is_integer(&self.value) {
            return None;
        }
        for (suffix, exp) in BINARY_SUFFIXES.iter().rev() {
            let mantissa = self.value.clone() / pow1024(*exp);
            if is_integer(&mantissa) {
                return Some(format!("{}{}", mantissa.with_scale(0), suffix));
            }
        }
        Some(self.value.with_scale(0).to_string())
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.value.is_zero() {
            return write!(f, "0");
        }
        let rendered = match self.format {
            Some(QuantityFormat::BinarySi) => self
                .render_binary()
                .unwrap_or_else(|| self.render_decimal()),
            Some(QuantityFormat::DecimalExponent) => self.render_exponent(),
            Some(QuantityFormat::DecimalSi) | None => self.render_decimal(),
        };
        write!(f, "{}", rendered)
    }
}

impl FromStr for Quantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Quantity::parse(s)
    }
}

impl TryFrom<&KubeQuantity> for Quantity {
    type Error = Error;

    fn try_from(q: &KubeQuantity) -> Result<Self> {
        Quantity::parse(&q.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn q(s: &str) -> Quantity {
        Quantity::parse(s).unwrap()
    }

    #[test]
    fn test_parse_binary() {
        assert_eq!(q("1Ki").value(), &BigDecimal::from(1024));
        assert_eq!(q("10Gi").value(), &BigDecimal::from(10u64 << 30));
        assert_eq!(q("1.5Gi").value(), &BigDecimal::from(3u64 << 29));
        assert_eq!(q("10Gi").format(), Some(QuantityFormat::BinarySi));
    }

    #[test]
    fn test_parse_decimal_and_exponent() {
        assert_eq!(q("500M").value(), &BigDecimal::from(500_000_000));
        assert_eq!(q("100m").value(), &BigDecimal::from_str("0.1").unwrap());
        assert_eq!(q("1e3").value(), &BigDecimal::from(1000));
        assert_eq!(q("1E").format(), Some(QuantityFormat::DecimalSi));
        assert_eq!(q("1E3").format(), Some(QuantityFormat::DecimalExponent));
        assert_eq!(q("-2k").value(), &BigDecimal::from(-2000));
        assert_eq!(q("42").format(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!(Quantity::parse(""), Err(Error::CapacityParse(_)));
        assert_matches!(Quantity::parse("abc"), Err(Error::CapacityParse(_)));
        assert_matches!(Quantity::parse("10Xi"), Err(Error::CapacityParse(_)));
        assert_matches!(Quantity::parse("1.2.3"), Err(Error::CapacityParse(_)));
        assert_matches!(Quantity::parse("Gi"), Err(Error::CapacityParse(_)));
        assert_matches!(Quantity::parse("1e"), Err(Error::CapacityParse(_)));
    }

    #[test]
    fn test_exponent_is_bounded() {
        assert_eq!(q("1e64").value(), &pow10(64));
        assert_eq!(q("1e-64").value(), &pow10(-64));
        assert_matches!(Quantity::parse("1e65"), Err(Error::CapacityParse(_)));
        assert_matches!(Quantity::parse("1e-65"), Err(Error::CapacityParse(_)));
        assert_matches!(Quantity::parse("1e3000000"), Err(Error::CapacityParse(_)));
        assert_matches!(
            Quantity::parse("1e-9223372036854775808"),
            Err(Error::CapacityParse(msg)) if msg.contains("invalid exponent")
        );
        assert_matches!(
            Quantity::parse("1e2147483647"),
            Err(Error::CapacityParse(msg)) if msg.contains("out of range")
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(q("10Gi").to_string(), "10Gi");
        assert_eq!(q("1024Mi").to_string(), "1Gi");
        assert_eq!(q("1.5Gi").to_string(), "1536Mi");
        assert_eq!(q("1500M").to_string(), "1500M");
        assert_eq!(q("2000k").to_string(), "2M");
        assert_eq!(q("100m").to_string(), "100m");
        assert_eq!(q("3e6").to_string(), "3e6");
        assert_eq!(q("3e21").to_string(), "3e21");
        assert_eq!(q("1e4").to_string(), "10e3");
        assert_eq!(q("15e-2").to_string(), "150e-3");
        assert_eq!(q("7e0").to_string(), "7");
        assert_eq!(q("0Gi").to_string(), "0");
        assert_eq!(Quantity::zero().to_string(), "0");
    }

    #[test]
    fn test_checked_add_is_exact() {
        let mut total = Quantity::zero();
        for _ in 0..1000 {
            total = total.checked_add(&q("100m")).unwrap();
        }
        assert_eq!(total.value(), &BigDecimal::from(100));
        assert_eq!(total.to_string(), "100");
    }

    #[test]
    fn test_checked_add_formats() {
        let sum = q("10Gi").checked_add(&q("5Gi")).unwrap();
        assert_eq!(sum.to_string(), "15Gi");

        // A neutral operand adopts the other's family
        let sum = Quantity::zero().checked_add(&q("10Gi")).unwrap();
        assert_eq!(sum.format(), Some(QuantityFormat::BinarySi));
        let sum = q("10Gi").checked_add(&q("1024")).unwrap();
        assert_eq!(sum.to_string(), "10485761Ki");

        assert_matches!(
            q("10Gi").checked_add(&q("5G")),
            Err(Error::CapacityUnitMismatch { .. })
        );
        assert_matches!(
            q("1e9").checked_add(&q("1Ki")),
            Err(Error::CapacityUnitMismatch { .. })
        );
    }

    #[test]
    fn test_decimal_notations_add() {
        let sum = q("1G").checked_add(&q("1e9")).unwrap();
        assert_eq!(sum.value(), &BigDecimal::from(2_000_000_000u64));
        assert_eq!(sum.to_string(), "2G");

        let sum = q("1e9").checked_add(&q("500M")).unwrap();
        assert_eq!(sum.format(), Some(QuantityFormat::DecimalExponent));
        assert_eq!(sum.to_string(), "1500e6");
    }

    #[test]
    fn test_from_kube_quantity() {
        let kq = KubeQuantity("20Gi".to_string());
        assert_eq!(Quantity::try_from(&kq).unwrap(), q("20Gi"));
    }
}
