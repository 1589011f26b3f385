//! Achievable pulse frequency catalog, keyed by sampling granularity.
//!
//! The GPIO daemon can only time pulses on its sampling grid, so each
//! supported sampling granularity comes with a fixed set of pulse
//! frequencies it can actually produce. The catalog is consulted once at
//! configuration time to reject unsupported granularities; it places no
//! constraint on individual speed commands beyond that.

use crate::error::ConfigError;

/// Sampling granularities [µs] the catalog covers.
pub const SUPPORTED_SAMPLE_RATES_US: [u32; 6] = [1, 2, 4, 5, 8, 10];

const FREQS_1_US: [u32; 18] = [
    40_000, 20_000, 10_000, 8_000, 5_000, 4_000, 2_500, 2_000, 1_600, //
    1_250, 1_000, 800, 500, 400, 250, 200, 100, 50,
];

const FREQS_2_US: [u32; 18] = [
    20_000, 10_000, 5_000, 4_000, 2_500, 2_000, 1_250, 1_000, 800, //
    625, 500, 400, 250, 200, 125, 100, 50, 25,
];

const FREQS_4_US: [u32; 18] = [
    10_000, 5_000, 2_500, 2_000, 1_250, 1_000, 625, 500, 400, //
    313, 250, 200, 125, 100, 63, 50, 25, 13,
];

const FREQS_5_US: [u32; 18] = [
    8_000, 4_000, 2_000, 1_600, 1_000, 800, 500, 400, 320, //
    250, 200, 160, 100, 80, 50, 40, 20, 10,
];

const FREQS_8_US: [u32; 18] = [
    5_000, 2_500, 1_250, 1_000, 625, 500, 313, 250, 200, //
    156, 125, 100, 63, 50, 31, 25, 13, 6,
];

const FREQS_10_US: [u32; 18] = [
    4_000, 2_000, 1_000, 800, 500, 400, 250, 200, 160, //
    125, 100, 80, 50, 40, 25, 20, 10, 5,
];

/// Achievable pulse frequencies [Hz, descending] for a sampling granularity.
///
/// Returns [`ConfigError::UnsupportedSampleRate`] for granularities outside
/// [`SUPPORTED_SAMPLE_RATES_US`].
pub fn lookup(sample_rate_us: u32) -> Result<&'static [u32], ConfigError> {
    match sample_rate_us {
        1 => Ok(&FREQS_1_US),
        2 => Ok(&FREQS_2_US),
        4 => Ok(&FREQS_4_US),
        5 => Ok(&FREQS_5_US),
        8 => Ok(&FREQS_8_US),
        10 => Ok(&FREQS_10_US),
        other => Err(ConfigError::UnsupportedSampleRate(other)),
    }
}

/// Whether `sample_rate_us` is a catalog key.
#[inline]
pub fn is_supported(sample_rate_us: u32) -> bool {
    SUPPORTED_SAMPLE_RATES_US.contains(&sample_rate_us)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_supported_rates_resolve() {
        for rate in SUPPORTED_SAMPLE_RATES_US {
            let freqs = lookup(rate).unwrap();
            assert_eq!(freqs.len(), 18, "rate {rate}");
        }
    }

    #[test]
    fn frequencies_are_descending() {
        for rate in SUPPORTED_SAMPLE_RATES_US {
            let freqs = lookup(rate).unwrap();
            assert!(
                freqs.windows(2).all(|w| w[0] > w[1]),
                "rate {rate} not strictly descending"
            );
        }
    }

    #[test]
    fn unsupported_rate_is_rejected() {
        assert!(matches!(
            lookup(3),
            Err(ConfigError::UnsupportedSampleRate(3))
        ));
        assert!(!is_supported(0));
        assert!(is_supported(5));
    }
}
