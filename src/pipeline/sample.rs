//! Stage 10: probabilistic sampling (§4.2, §8 property 7). Errors and above
//! are exempt (§4.2: "Errors are never sampled").

use lumen_common::Level;
use rand::Rng;

pub fn should_keep(level: Level, sampling_rate: f64) -> bool {
    if level.is_error_or_above() {
        return true;
    }
    if sampling_rate >= 1.0 {
        return true;
    }
    if sampling_rate <= 0.0 {
        return false;
    }
    rand::rng().random::<f64>() < sampling_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_never_sampled_out() {
        for _ in 0..1000 {
            assert!(should_keep(Level::Error, 0.0));
            assert!(should_keep(Level::Critical, 0.0));
        }
    }

    #[test]
    fn rate_zero_drops_everything_below_error() {
        for _ in 0..1000 {
            assert!(!should_keep(Level::Info, 0.0));
        }
    }

    #[test]
    fn rate_one_keeps_everything() {
        for _ in 0..1000 {
            assert!(should_keep(Level::Debug, 1.0));
        }
    }

    #[test]
    fn sampling_converges_to_the_configured_rate() {
        let trials = 20_000;
        let kept = (0..trials).filter(|_| should_keep(Level::Info, 0.3)).count();
        let fraction = kept as f64 / trials as f64;
        assert!((fraction - 0.3).abs() < 0.02, "fraction was {fraction}");
    }
}
