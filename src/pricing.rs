use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::{Ms, Span, SurfaceType};

/// Price of a court booking.
///
/// Missing inputs quote zero instead of failing. A span shorter than one
/// minute is billed as exactly one minute. The result is rounded half-up to
/// two decimal places. `None` when the amount does not fit a `Decimal`.
pub fn price(
    starts_at: Option<Ms>,
    ends_at: Option<Ms>,
    doubles: bool,
    surface: Option<&SurfaceType>,
) -> Option<Decimal> {
    let (Some(start), Some(end), Some(surface)) = (starts_at, ends_at, surface) else {
        return Some(Decimal::ZERO);
    };

    let minutes = Span { start, end }.whole_minutes();
    let unit_price = if doubles {
        surface.cost_per_minute.checked_mul(doubles_multiplier())?
    } else {
        surface.cost_per_minute
    };

    let raw = if minutes == 0 {
        unit_price
    } else {
        unit_price.checked_mul(Decimal::from(minutes))?
    };
    Some(to_money(raw))
}

/// Round half-up to exactly two fractional digits.
pub fn to_money(amount: Decimal) -> Decimal {
    let mut cost = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    cost.rescale(2);
    cost
}

fn doubles_multiplier() -> Decimal {
    Decimal::new(15, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MINUTE_MS;
    use rust_decimal_macros::dec;

    const T0: Ms = 1_767_261_600_000; // 2026-01-01T10:00:00Z

    fn surface(rate: Decimal) -> SurfaceType {
        SurfaceType {
            id: 1,
            name: "clay".into(),
            cost_per_minute: rate,
            created_at: 0,
            deleted_at: None,
        }
    }

    #[test]
    fn singles_hour() {
        let s = surface(dec!(3.50));
        let cost = price(Some(T0), Some(T0 + 60 * MINUTE_MS), false, Some(&s));
        assert_eq!(cost, Some(dec!(210.00)));
    }

    #[test]
    fn doubles_hour() {
        let s = surface(dec!(3.50));
        let cost = price(Some(T0), Some(T0 + 60 * MINUTE_MS), true, Some(&s));
        assert_eq!(cost, Some(dec!(315.00)));
    }

    #[test]
    fn zero_minutes_bills_one_unit() {
        let s = surface(dec!(3.50));
        assert_eq!(price(Some(T0), Some(T0), false, Some(&s)), Some(dec!(3.50)));
        assert_eq!(price(Some(T0), Some(T0 + 59_999), false, Some(&s)), Some(dec!(3.50)));
        assert_eq!(price(Some(T0), Some(T0 + 30_000), true, Some(&s)), Some(dec!(5.25)));
    }

    #[test]
    fn partial_minute_is_dropped() {
        let s = surface(dec!(2));
        let cost = price(Some(T0), Some(T0 + 90 * MINUTE_MS + 59_000), false, Some(&s)).unwrap();
        assert_eq!(cost, dec!(180.00));
        assert_eq!(cost.to_string(), "180.00");
    }

    #[test]
    fn rounds_half_up() {
        let s = surface(dec!(0.125));
        assert_eq!(price(Some(T0), Some(T0 + MINUTE_MS), false, Some(&s)), Some(dec!(0.13)));
        let s = surface(dec!(0.333));
        assert_eq!(price(Some(T0), Some(T0 + MINUTE_MS), true, Some(&s)), Some(dec!(0.50)));
    }

    #[test]
    fn missing_inputs_quote_zero() {
        let s = surface(dec!(3.50));
        assert_eq!(price(None, Some(T0), false, Some(&s)), Some(Decimal::ZERO));
        assert_eq!(price(Some(T0), None, false, Some(&s)), Some(Decimal::ZERO));
        assert_eq!(price(Some(T0), Some(T0 + MINUTE_MS), false, None), Some(Decimal::ZERO));
    }

    #[test]
    fn money_has_two_digits() {
        assert_eq!(to_money(dec!(150)).to_string(), "150.00");
        assert_eq!(to_money(dec!(99.905)).to_string(), "99.91");
    }

    #[test]
    fn same_inputs_same_price() {
        let s = surface(dec!(1.17));
        let a = price(Some(T0), Some(T0 + 47 * MINUTE_MS), true, Some(&s)).unwrap();
        let b = price(Some(T0), Some(T0 + 47 * MINUTE_MS), true, Some(&s)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.scale(), 2);
    }

    #[test]
    fn overflowing_amount_has_no_price() {
        let s = surface(Decimal::MAX);
        assert_eq!(price(Some(T0), Some(T0 + 60 * MINUTE_MS), false, Some(&s)), None);
        assert_eq!(price(Some(T0), Some(T0), true, Some(&s)), None);

        let s = surface(dec!(3.50));
        let cost = price(Some(i64::MIN), Some(i64::MAX), false, Some(&s)).unwrap();
        assert!(cost > dec!(3.50));
    }
}
