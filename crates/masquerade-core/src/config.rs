//! Configuration — environment variables with per-field defaults.
//!
//! Every knob is optional. A value that fails to parse (or is out of range)
//! falls back to its default with a warning rather than aborting startup.

use std::path::PathBuf;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    /// Challenge fires once the human-authored message count reaches
    /// `human_threshold × number of human participants`.
    pub human_threshold: u32,

    /// Challenge fires whenever the total message count is a multiple of this.
    pub total_threshold: u32,

    /// Delay before a typing signal is surfaced to the partner.
    pub typing_debounce_ms: u64,

    /// How long a queued participant waits before being paired with the
    /// automated counterpart.
    pub wait_timeout_ms: u64,

    /// Artificial composition pacing for automated replies:
    /// `clamp(len × ms_per_char, min, max)`.
    pub reply_ms_per_char: u64,
    pub reply_min_delay_ms: u64,
    pub reply_max_delay_ms: u64,

    /// Probability that a participant with an empty queue is paired with the
    /// automated counterpart instead of enqueued. 0.5 is the fair coin.
    pub automated_bias: f64,

    /// Append-only guess record file.
    pub stats_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            human_threshold: 5,
            total_threshold: 10,
            typing_debounce_ms: 500,
            wait_timeout_ms: 30_000,
            reply_ms_per_char: 25,
            reply_min_delay_ms: 600,
            reply_max_delay_ms: 4_000,
            automated_bias: 0.5,
            stats_path: PathBuf::from("guesses.jsonl"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Config::default();
        Self {
            human_threshold: positive_u32("MASQ_HUMAN_THRESHOLD", d.human_threshold),
            total_threshold: positive_u32("MASQ_TOTAL_THRESHOLD", d.total_threshold),
            typing_debounce_ms: millis("MASQ_TYPING_DEBOUNCE_MS", d.typing_debounce_ms),
            wait_timeout_ms: millis("MASQ_WAIT_TIMEOUT_MS", d.wait_timeout_ms),
            reply_ms_per_char: millis("MASQ_REPLY_MS_PER_CHAR", d.reply_ms_per_char),
            reply_min_delay_ms: millis("MASQ_REPLY_MIN_DELAY_MS", d.reply_min_delay_ms),
            reply_max_delay_ms: millis("MASQ_REPLY_MAX_DELAY_MS", d.reply_max_delay_ms),
            automated_bias: bias("MASQ_AUTOMATED_BIAS", d.automated_bias),
            stats_path: std::env::var("MASQ_STATS_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.stats_path),
        }
    }
}

fn positive_u32(var: &str, default: u32) -> u32 {
    match std::env::var(var) {
        Ok(raw) => parse_positive_u32(var, &raw, default),
        Err(_) => default,
    }
}

fn millis(var: &str, default: u64) -> u64 {
    match std::env::var(var) {
        Ok(raw) => parse_millis(var, &raw, default),
        Err(_) => default,
    }
}

fn bias(var: &str, default: f64) -> f64 {
    match std::env::var(var) {
        Ok(raw) => parse_bias(var, &raw, default),
        Err(_) => default,
    }
}

fn parse_positive_u32(var: &str, raw: &str, default: u32) -> u32 {
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => {
            warn!("{}={:?} is not a positive integer, using {}", var, raw, default);
            default
        }
    }
}

fn parse_millis(var: &str, raw: &str, default: u64) -> u64 {
    match raw.trim().parse::<u64>() {
        Ok(n) => n,
        Err(_) => {
            warn!("{}={:?} is not a millisecond count, using {}", var, raw, default);
            default
        }
    }
}

fn parse_bias(var: &str, raw: &str, default: f64) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(p) if p.is_finite() => p.clamp(0.0, 1.0),
        _ => {
            warn!("{}={:?} is not a probability, using {}", var, raw, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.human_threshold, 5);
        assert_eq!(c.total_threshold, 10);
        assert_eq!(c.typing_debounce_ms, 500);
        assert_eq!(c.wait_timeout_ms, 30_000);
        assert_eq!(c.reply_ms_per_char, 25);
        assert_eq!(c.reply_min_delay_ms, 600);
        assert_eq!(c.reply_max_delay_ms, 4_000);
    }

    #[test]
    fn test_invalid_threshold_falls_back() {
        assert_eq!(parse_positive_u32("X", "0", 5), 5);
        assert_eq!(parse_positive_u32("X", "-3", 5), 5);
        assert_eq!(parse_positive_u32("X", "many", 5), 5);
        assert_eq!(parse_positive_u32("X", "7", 5), 7);
    }

    #[test]
    fn test_invalid_millis_falls_back() {
        assert_eq!(parse_millis("X", "soon", 500), 500);
        assert_eq!(parse_millis("X", "250", 500), 250);
    }

    #[test]
    fn test_bias_is_clamped() {
        assert_eq!(parse_bias("X", "1.5", 0.5), 1.0);
        assert_eq!(parse_bias("X", "-1", 0.5), 0.0);
        assert_eq!(parse_bias("X", "0.25", 0.5), 0.25);
        assert_eq!(parse_bias("X", "coin", 0.5), 0.5);
    }
}
