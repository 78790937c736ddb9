//! Temporal decay: half-life weighting with a floor.

/// Decay weight for an item of the given age:
/// max(exp(-ln 2 * age / half_life), floor). Age 0 yields 1.
pub fn temporal_weight(age_secs: f64, half_life_days: f64, floor: f64) -> f64 {
    let half_life_secs = half_life_days * 86_400.0;
    let age = age_secs.max(0.0);
    (-std::f64::consts::LN_2 * age / half_life_secs).exp().max(floor)
}

/// Fold the weight into a score: score * (0.7 + 0.3 * weight). Recency
/// modulates at most 30% of the score.
pub fn apply(score: f64, weight: f64) -> f64 {
    score * (0.7 + 0.3 * weight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_age_has_full_weight() {
        assert!((temporal_weight(0.0, 30.0, 0.1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn one_half_life_halves_the_weight() {
        let w = temporal_weight(30.0 * 86_400.0, 30.0, 0.1);
        assert!((w - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sixty_days_at_thirty_day_half_life_is_quarter() {
        let w = temporal_weight(60.0 * 86_400.0, 30.0, 0.1);
        assert!((w - 0.25).abs() < 1e-9);
    }

    #[test]
    fn ancient_items_hit_the_floor() {
        let w = temporal_weight(3650.0 * 86_400.0, 30.0, 0.1);
        assert!((w - 0.1).abs() < 1e-12);
    }

    #[test]
    fn negative_age_clamps_to_full_weight() {
        // Clock skew: an item "from the future" decays like a fresh one.
        assert!((temporal_weight(-500.0, 30.0, 0.1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn apply_bounds() {
        assert!((apply(1.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((apply(1.0, 0.0) - 0.7).abs() < 1e-12);
    }
}
