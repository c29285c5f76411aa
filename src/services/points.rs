use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::utils::error::AppError;

/// Converts money spent into loyalty points: one point per `ratio` currency
/// units, rounded down. Pure and deterministic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointCalculator {
    ratio: Decimal,
}

impl PointCalculator {
    pub fn new(ratio: Decimal) -> Result<Self, AppError> {
        if ratio <= Decimal::ZERO {
            return Err(AppError::ValidationError(format!(
                "point ratio must be positive, got {}",
                ratio
            )));
        }
        Ok(Self { ratio })
    }

    /// Negative amounts (refunds, bad input) earn nothing. Results beyond
    /// `i64` saturate.
    pub fn compute_redeem_points(&self, amount_spent: Decimal) -> i64 {
        if amount_spent <= Decimal::ZERO {
            return 0;
        }
        (amount_spent / self.ratio)
            .round_dp_with_strategy(0, RoundingStrategy::ToZero)
            .to_i64()
            .unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator(ratio: i64) -> PointCalculator {
        PointCalculator::new(Decimal::from(ratio)).unwrap()
    }

    #[test]
    fn test_floor_division() {
        let calc = calculator(1000);
        assert_eq!(calc.compute_redeem_points(Decimal::from(150_000)), 150);
        assert_eq!(calc.compute_redeem_points(Decimal::from(999)), 0);
        assert_eq!(calc.compute_redeem_points(Decimal::new(1_999_99, 2)), 1);
    }

    #[test]
    fn test_fractional_ratio() {
        let calc = PointCalculator::new(Decimal::new(25, 1)).unwrap();
        assert_eq!(calc.compute_redeem_points(Decimal::from(10)), 4);
        assert_eq!(calc.compute_redeem_points(Decimal::new(124, 1)), 4);
    }

    #[test]
    fn test_non_positive_amounts_earn_nothing() {
        let calc = calculator(1000);
        assert_eq!(calc.compute_redeem_points(Decimal::ZERO), 0);
        assert_eq!(calc.compute_redeem_points(Decimal::from(-5000)), 0);
    }

    #[test]
    fn test_same_input_same_output() {
        let calc = calculator(750);
        let amount = Decimal::new(123_456_789, 2);
        let first = calc.compute_redeem_points(amount);
        for _ in 0..10 {
            assert_eq!(calc.compute_redeem_points(amount), first);
        }
    }

    #[test]
    fn test_rejects_non_positive_ratio() {
        assert!(PointCalculator::new(Decimal::ZERO).is_err());
        assert!(PointCalculator::new(Decimal::from(-1)).is_err());
    }
}
