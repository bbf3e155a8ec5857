//! Shared data-quality scoring primitive used by every consolidator and by
//! the lab-computer associator. One code path for the floor/ceiling clamp
//! means the clamp invariant only needs to be tested once.

use rust_decimal::Decimal;

/// Applies each `(condition, delta, flag)` rule in order to `start`,
/// collecting the flag name whenever its condition is true, then clamps the
/// running score to `[0, 1]`. Entity-specific callers supply rule tables as
/// plain data rather than branching `if` chains.
pub fn score(start: Decimal, rules: &[(bool, Decimal, &'static str)]) -> (Decimal, Vec<String>) {
    let mut value = start;
    let mut flags = Vec::new();
    for (condition, delta, flag) in rules {
        if *condition {
            value += *delta;
            flags.push((*flag).to_string());
        }
    }
    (clamp_unit(value), flags)
}

/// Clamps a confidence/quality score to `[0.00, 1.00]`.
pub fn clamp_unit(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, Decimal::ONE)
}

/// Clamps a score to an arbitrary `[floor, ceiling]` band — used by the
/// lab-computer associator's per-tier bounds.
pub fn clamp_band(value: Decimal, floor: Decimal, ceiling: Decimal) -> Decimal {
    value.clamp(floor, ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rules_apply_in_order_and_collect_flags() {
        let rules = [
            (true, dec!(-0.2), "missing_email"),
            (false, dec!(-0.1), "missing_name"),
            (true, dec!(-0.1), "missing_department"),
        ];
        let (score, flags) = score(dec!(1.0), &rules);
        assert_eq!(score, dec!(0.7));
        assert_eq!(flags, vec!["missing_email", "missing_department"]);
    }

    #[test]
    fn score_clamps_to_unit_interval() {
        let rules = [(true, dec!(-5.0), "way_too_low")];
        let (score, _) = score(dec!(1.0), &rules);
        assert_eq!(score, dec!(0));

        let rules = [(true, dec!(5.0), "way_too_high")];
        let (score, _) = score(dec!(1.0), &rules);
        assert_eq!(score, dec!(1));
    }

    #[test]
    fn band_clamp_respects_tier_floor_and_ceiling() {
        assert_eq!(clamp_band(dec!(0.05), dec!(0.20), dec!(0.50)), dec!(0.20));
        assert_eq!(clamp_band(dec!(0.90), dec!(0.20), dec!(0.50)), dec!(0.50));
        assert_eq!(clamp_band(dec!(0.35), dec!(0.20), dec!(0.50)), dec!(0.35));
    }
}
