//! Kubernetes resource quantity parsing.
//!
//! Quantities are carried as strings in the CRD (`1Gi`, `100m`, `2`). The operator needs their
//! numeric value in a few places: validation of zero/non-zero sizes, the bootstrapper's
//! `POD_CPU_MILLICORES` / `POD_MEMORY_BYTES` env vars, and capping sidecar resources.

use std::cmp::Ordering;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AppError;

lazy_static! {
    static ref QUANTITY: Regex = Regex::new(r"^([+-]?)([0-9]*)(?:\.([0-9]*))?(Ki|Mi|Gi|Ti|Pi|Ei|n|u|m|k|M|G|T|P|E|[eE][+-]?[0-9]+)?$")
        .expect("failed to compile QUANTITY regex");
}

/// The largest decimal exponent accepted, which keeps the milli value within an `i128`.
const MAX_EXPONENT: i32 = 24;

/// A parsed resource quantity, held as a milli-unit value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedQuantity {
    millis: i128,
}

impl ParsedQuantity {
    /// Parse the given quantity string. An empty string parses as zero.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(Self { millis: 0 });
        }
        let invalid = || AppError::InvalidQuantity(value.to_string());
        let caps = QUANTITY.captures(value).ok_or_else(invalid)?;
        let negative = caps.get(1).map(|m| m.as_str() == "-").unwrap_or(false);
        let whole = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let fraction = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        // Mantissa as an integer with `fraction.len()` implied decimal places.
        let digits = format!("{}{}", whole, fraction);
        let mantissa: i128 = digits.parse().map_err(|_| invalid())?;
        let mut decimal_exp = -(fraction.len() as i32) + 3; // Scale to millis.
        let mut binary_mult: i128 = 1;
        match caps.get(4).map(|m| m.as_str()) {
            None => (),
            Some("Ki") => binary_mult = 1 << 10,
            Some("Mi") => binary_mult = 1 << 20,
            Some("Gi") => binary_mult = 1 << 30,
            Some("Ti") => binary_mult = 1 << 40,
            Some("Pi") => binary_mult = 1 << 50,
            Some("Ei") => binary_mult = 1 << 60,
            Some("n") => decimal_exp -= 9,
            Some("u") => decimal_exp -= 6,
            Some("m") => decimal_exp -= 3,
            Some("k") => decimal_exp += 3,
            Some("M") => decimal_exp += 6,
            Some("G") => decimal_exp += 9,
            Some("T") => decimal_exp += 12,
            Some("P") => decimal_exp += 15,
            Some("E") => decimal_exp += 18,
            Some(exp) => {
                let exp: i32 = exp[1..].parse().map_err(|_| invalid())?;
                if exp.abs() > MAX_EXPONENT {
                    return Err(invalid());
                }
                decimal_exp += exp;
            }
        }

        let scaled = mantissa.checked_mul(binary_mult).ok_or_else(invalid)?;
        let millis = if decimal_exp >= 0 {
            scaled.checked_mul(pow10(decimal_exp).ok_or_else(invalid)?).ok_or_else(invalid)?
        } else {
            // Round up, matching how Kubernetes reports fractional milli values.
            let divisor = pow10(-decimal_exp).ok_or_else(invalid)?;
            (scaled + divisor - 1) / divisor
        };
        Ok(Self {
            millis: if negative { -millis } else { millis },
        })
    }

    /// The value in milli-units, rounded up.
    pub fn milli_value(&self) -> i128 {
        self.millis
    }

    /// The value in whole units, rounded up.
    pub fn value(&self) -> i128 {
        if self.millis >= 0 {
            (self.millis + 999) / 1000
        } else {
            self.millis / 1000
        }
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }
}

impl PartialOrd for ParsedQuantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ParsedQuantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis.cmp(&other.millis)
    }
}

/// Pick the smaller of two quantity strings, preferring `value` on ties or when either side
/// does not parse.
pub fn min_quantity<'a>(value: &'a str, cap: &'a str) -> &'a str {
    match (ParsedQuantity::parse(value), ParsedQuantity::parse(cap)) {
        (Ok(v), Ok(c)) if c < v => cap,
        _ => value,
    }
}

fn pow10(exp: i32) -> Option<i128> {
    10i128.checked_pow(exp as u32)
}
