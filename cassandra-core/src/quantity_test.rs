use anyhow::Result;

use crate::quantity::{min_quantity, ParsedQuantity};

#[test]
fn parse_binary_and_decimal_suffixes() -> Result<()> {
    let cases = [
        ("1Gi", 1_073_741_824_000),
        ("50Mi", 52_428_800_000),
        ("1k", 1_000_000),
        ("2", 2_000),
        ("100m", 100),
        ("0.5", 500),
        ("1e3", 1_000_000),
        ("", 0),
    ];
    for (input, expected) in cases {
        let parsed = ParsedQuantity::parse(input)?;
        assert!(
            parsed.milli_value() == expected,
            "unexpected milli value parsed for {}, got {}, expected {}",
            input,
            parsed.milli_value(),
            expected
        );
    }
    Ok(())
}

#[test]
fn value_rounds_up_fractional_units() -> Result<()> {
    let parsed = ParsedQuantity::parse("1500m")?;
    assert!(parsed.value() == 2, "expected 1500m to round up to 2, got {}", parsed.value());
    let parsed = ParsedQuantity::parse("1n")?;
    assert!(parsed.milli_value() == 1, "expected 1n to round up to 1m, got {}", parsed.milli_value());
    Ok(())
}

#[test]
fn parse_rejects_garbage() {
    for input in ["abc", "1Gb", "--1", ".", "1.2.3"] {
        assert!(ParsedQuantity::parse(input).is_err(), "expected {} to be rejected", input);
    }
}

#[test]
fn zero_quantities_are_zero() -> Result<()> {
    for input in ["0", "0Gi", "0.0", ""] {
        assert!(ParsedQuantity::parse(input)?.is_zero(), "expected {} to be zero", input);
    }
    Ok(())
}

#[test]
fn min_quantity_caps_values() {
    assert_eq!(min_quantity("1Gi", "50Mi"), "50Mi");
    assert_eq!(min_quantity("10Mi", "50Mi"), "10Mi");
    assert_eq!(min_quantity("2", "100m"), "100m");
    assert_eq!(min_quantity("50m", "100m"), "50m");
}
