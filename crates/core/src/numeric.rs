use rust_decimal::Decimal;
use std::str::FromStr;

/// Converts a configuration scalar to `Decimal` via its shortest decimal
/// representation, so `0.0005_f64` becomes exactly `0.0005` rather than its
/// binary expansion. Non-finite values collapse to zero.
#[must_use]
pub fn dec(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&value.to_string()).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec as d;

    #[test]
    fn conversion_uses_shortest_representation() {
        assert_eq!(dec(0.0005), d!(0.0005));
        assert_eq!(dec(0.0007), d!(0.0007));
        assert_eq!(dec(0.01), d!(0.01));
        assert_eq!(dec(2.0), d!(2.0));
    }

    #[test]
    fn non_finite_collapses_to_zero() {
        assert_eq!(dec(f64::NAN), Decimal::ZERO);
        assert_eq!(dec(f64::INFINITY), Decimal::ZERO);
    }
}
