use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;
use crate::gmon::WordSize;
use crate::range::{TextRange, HISTFRACTION};

/// Default sampling frequency, in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 1000;

/// How long [`stop`](crate::Profiler::stop) waits for the sampler thread by default.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the dump goes when no destination is given.
pub const DEFAULT_OUTPUT: &str = "gmon.out";

/// Environment variable overriding [`Options::output`].
pub const ENV_OUTPUT: &str = "GMON_OUT";

/// Environment variable overriding [`Options::sample_rate`].
pub const ENV_SAMPLE_RATE: &str = "GMON_PROFRATE";

/// Environment variable overriding [`Options::address_bias`]. Accepts decimal or `0x` hex.
pub const ENV_ADDRESS_BIAS: &str = "GMON_ADDRESS_BIAS";

/// Profiling session configuration options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// The instrumented address range, in link-time addresses.
    ///
    /// When `None`, the range is read from the linker's boundary symbols at start (see
    /// [`TextRange::from_link_markers`]). Starting fails if neither is available.
    pub text_range: Option<TextRange>,

    /// Difference between where code is loaded at runtime and where it was linked.
    ///
    /// Subtracted (wrapping) from both addresses handed to the hook before they are range
    /// checked. Default is 0, i.e. the binary runs at its link address.
    pub address_bias: usize,

    /// Number of bytes of text covered by each bucket. Default is 4.
    pub hist_fraction: usize,

    /// Histogram sampling frequency in Hz. Default is 1000.
    pub sample_rate: u32,

    /// Upper bound on how long stopping waits for the sampler thread. Default is 2 seconds.
    pub stop_timeout: Duration,

    /// Dump destination used when [`stop`](crate::Profiler::stop) is not given one, and by the
    /// process-exit hook. Default is `gmon.out` in the working directory.
    pub output: PathBuf,

    /// Width of addresses and arc counts in the dump. Default is the host pointer width.
    pub word_size: WordSize,

    /// Register a process-exit hook that stops and dumps the global profiler. Default is `true`.
    ///
    /// Only meaningful for [`PROFILER`](crate::PROFILER); standalone profilers never register one.
    pub exit_hook: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            text_range: None,
            address_bias: 0,
            hist_fraction: HISTFRACTION,
            sample_rate: DEFAULT_SAMPLE_RATE,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            output: PathBuf::from(DEFAULT_OUTPUT),
            word_size: WordSize::native(),
            exit_hook: true,
        }
    }
}

impl Options {
    /// The default options, overridden by `GMON_OUT`, `GMON_PROFRATE` and `GMON_ADDRESS_BIAS`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        options.apply_env(|key| env::var_os(key));
        options
    }

    pub(crate) fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<OsString>,
    {
        if let Some(path) = var(ENV_OUTPUT).filter(|p| !p.is_empty()) {
            self.output = PathBuf::from(path);
        }

        if let Some(value) = var(ENV_SAMPLE_RATE) {
            match value.to_str().and_then(|v| v.trim().parse::<u32>().ok()) {
                Some(rate) if rate > 0 => self.sample_rate = rate,
                _ => warn!("Ignoring invalid {}={:?}", ENV_SAMPLE_RATE, value),
            }
        }

        if let Some(value) = var(ENV_ADDRESS_BIAS) {
            match value.to_str().and_then(parse_address) {
                Some(bias) => self.address_bias = bias,
                None => warn!("Ignoring invalid {}={:?}", ENV_ADDRESS_BIAS, value),
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.hist_fraction == 0 {
            return Err(Error::InvalidOptions("bucket width must be non-zero"));
        }
        if self.sample_rate == 0 {
            return Err(Error::InvalidOptions("sample rate must be non-zero"));
        }
        Ok(())
    }
}

fn parse_address(s: &str) -> Option<usize> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with_env(vars: &[(&str, &str)]) -> Options {
        let vars: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        let mut options = Options::default();
        options.apply_env(|key| vars.get(key).cloned());
        options
    }

    #[test]
    fn defaults() {
        let options = Options::default();
        assert_eq!(options.hist_fraction, 4);
        assert_eq!(options.sample_rate, 1000);
        assert_eq!(options.stop_timeout, Duration::from_secs(2));
        assert_eq!(options.output, PathBuf::from("gmon.out"));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn env_overrides() {
        let options = with_env(&[
            (ENV_OUTPUT, "/tmp/profile.out"),
            (ENV_SAMPLE_RATE, "250"),
            (ENV_ADDRESS_BIAS, "0xB"),
        ]);
        assert_eq!(options.output, PathBuf::from("/tmp/profile.out"));
        assert_eq!(options.sample_rate, 250);
        assert_eq!(options.address_bias, 0xb);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let options = with_env(&[
            (ENV_OUTPUT, ""),
            (ENV_SAMPLE_RATE, "0"),
            (ENV_ADDRESS_BIAS, "0xzz"),
        ]);
        assert_eq!(options, Options::default());
    }

    #[test]
    fn decimal_bias() {
        assert_eq!(with_env(&[(ENV_ADDRESS_BIAS, " 4096 ")]).address_bias, 4096);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let options = Options {
            hist_fraction: 0,
            ..Options::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidOptions(_))));

        let options = Options {
            sample_rate: 0,
            ..Options::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidOptions(_))));
    }
}
