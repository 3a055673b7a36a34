//! Bracketing a discrete parameter between sampled curves.

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bracket {
    pub low: f64,
    pub high: f64,
}

/// Curves surrounding `query` on a key grid of spacing `step`.
///
/// `high` is capped at `max_key`, so a query at the top of the dataset yields
/// `low == high`.
pub fn bracket(query: f64, step: f64, max_key: f64) -> Bracket {
    let low = (query / step).floor() * step;
    let high = (low + step).min(max_key);
    Bracket { low, high }
}

/// Straight line through `(low, value_low)` and `(high, value_high)` at `query`.
///
/// Not clamped: queries outside `[low, high]` extrapolate past both values.
pub fn extrapolate(query: f64, low: f64, value_low: f64, high: f64, value_high: f64) -> f64 {
    if high == low {
        return value_low;
    }
    value_low + (value_high - value_low) * (query - low) / (high - low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_interior() {
        assert_eq!(bracket(23.0, 10.0, 50.0), Bracket { low: 20.0, high: 30.0 });
    }

    #[test]
    fn test_bracket_negative_query_floors_down() {
        assert_eq!(bracket(-35.0, 10.0, 50.0), Bracket { low: -40.0, high: -30.0 });
    }

    #[test]
    fn test_bracket_at_max_key_collapses() {
        assert_eq!(bracket(50.0, 10.0, 50.0), Bracket { low: 50.0, high: 50.0 });
        assert_eq!(bracket(100.0, 25.0, 100.0), Bracket { low: 100.0, high: 100.0 });
    }

    #[test]
    fn test_extrapolate_degenerate_returns_low_value() {
        assert_eq!(extrapolate(50.0, 50.0, 4321.5, 50.0, 9999.0), 4321.5);
        assert_eq!(extrapolate(57.0, 50.0, 4321.5, 50.0, 4321.5), 4321.5);
    }

    #[test]
    fn test_extrapolate_linear() {
        assert_eq!(extrapolate(25.0, 20.0, 100.0, 30.0, 200.0), 150.0);
        assert_eq!(extrapolate(20.0, 20.0, 100.0, 30.0, 200.0), 100.0);
    }

    #[test]
    fn test_extrapolate_goes_past_bracket() {
        let v = extrapolate(35.0, 20.0, 100.0, 30.0, 200.0);
        assert_eq!(v, 250.0);
        let v = extrapolate(10.0, 20.0, 100.0, 30.0, 200.0);
        assert_eq!(v, 0.0);
    }
}
