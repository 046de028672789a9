//! # Jitter for respawn delays.
//!
//! When several workers crash together (a bad deploy, an exhausted shared resource) their
//! replacements would otherwise be forked in lockstep. [`JitterPolicy`] spreads them out.
//!
//! - [`JitterPolicy::None`]  exact delay
//! - [`JitterPolicy::Full`]  random in `[0, delay]`
//! - [`JitterPolicy::Equal`] `delay/2 + random[0, delay/2]`

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

/// Randomization applied to a respawn delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter.
    #[default]
    None,
    /// Random delay in `[0, delay]`.
    Full,
    /// `delay/2 + random[0, delay/2]`.
    Equal,
}

impl JitterPolicy {
    /// Applies the jitter to `delay`.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return delay;
        }
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_millis(rand::rng().random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                let extra = if half == 0 {
                    0
                } else {
                    rand::rng().random_range(0..=half)
                };
                Duration::from_millis(half + extra)
            }
        }
    }
}

impl FromStr for JitterPolicy {
    type Err = String;

    /// Parses `none`, `full` or `equal` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(JitterPolicy::None),
            "full" => Ok(JitterPolicy::Full),
            "equal" => Ok(JitterPolicy::Equal),
            other => Err(format!("unknown jitter `{other}`, expected none, full or equal")),
        }
    }
}

impl fmt::Display for JitterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JitterPolicy::None => "none",
            JitterPolicy::Full => "full",
            JitterPolicy::Equal => "equal",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_jitter_never_exceeds_delay() {
        for _ in 0..100 {
            assert!(JitterPolicy::Full.apply(Duration::from_millis(250)) <= Duration::from_millis(250));
        }
    }

    #[test]
    fn parses_names() {
        assert_eq!("full".parse(), Ok(JitterPolicy::Full));
        assert_eq!(" Equal ".parse(), Ok(JitterPolicy::Equal));
        assert_eq!("none".parse(), Ok(JitterPolicy::None));
        assert!("decorrelated".parse::<JitterPolicy>().is_err());
        assert_eq!(JitterPolicy::Full.to_string(), "full");
    }

    #[test]
    fn zero_delay_stays_zero() {
        assert_eq!(JitterPolicy::Equal.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
    }
}
