//! Provides formatting and parsing helpers for durations and byte sizes.
//!
//! These implement the syntax accepted in **config/settings.yml**, e.g. `max_memory: 64m` for a
//! cache budget or `timeout: 500ms` for the peer fetch timeout.
use std::fmt::Write;
use std::time::Duration;

use anyhow::Context;

const UNITS: [&str; 6] = ["Bytes", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Formats a given size in bytes.
///
/// This picks the largest binary unit which keeps the value above 1 and renders at most three
/// significant digits.
///
/// # Examples
///
/// ```
/// assert_eq!(ringcache::fmt::format_size(0), "0 bytes");
/// assert_eq!(ringcache::fmt::format_size(1), "1 byte");
/// assert_eq!(ringcache::fmt::format_size(2048), "2.00 KiB");
/// assert_eq!(ringcache::fmt::format_size(87_340), "85.3 KiB");
/// assert_eq!(ringcache::fmt::format_size(873_400_000), "833 MiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    match size_in_bytes {
        1 => return "1 byte".to_owned(),
        n if n < 1024 => return format!("{} bytes", n),
        _ => (),
    }

    let mut magnitude = 0;
    let mut size = size_in_bytes as f64;
    while size > 1024. && magnitude < UNITS.len() - 1 {
        size /= 1024.;
        magnitude += 1;
    }

    let mut result = String::new();
    let _ = if size <= 10. {
        write!(result, "{:.2} {}", size, UNITS[magnitude])
    } else if size <= 100. {
        write!(result, "{:.1} {}", size, UNITS[magnitude])
    } else {
        write!(result, "{:.0} {}", size, UNITS[magnitude])
    };

    result
}

/// Parses a size expression like **512**, **16k** or **2 G** into a number of bytes.
///
/// Accepted suffixes are **b**, **k**, **m**, **g** and **t** (case insensitive), each being a
/// power of 1024. Note that **0** is a valid size and is used to declare an unbounded cache.
///
/// # Examples
///
/// ```
/// assert_eq!(ringcache::fmt::parse_size("0").unwrap(), 0);
/// assert_eq!(ringcache::fmt::parse_size("100b").unwrap(), 100);
/// assert_eq!(ringcache::fmt::parse_size("2k").unwrap(), 2048);
/// assert_eq!(ringcache::fmt::parse_size("8 M").unwrap(), 8 * 1024 * 1024);
///
/// assert_eq!(ringcache::fmt::parse_size("3 Y").is_err(), true);
/// assert_eq!(ringcache::fmt::parse_size("1.5g").is_err(), true);
/// assert_eq!(ringcache::fmt::parse_size("-1").is_err(), true);
/// ```
pub fn parse_size(str: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref NUMBER_AND_SUFFIX: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *([bBkKmMgGtT]?) *$").unwrap();
    }

    let captures = NUMBER_AND_SUFFIX.captures(str.as_ref()).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a size. \
             Expected a positive number and optionally 'b', 'k', 'm', 'g' or 't' as suffix.",
            str.as_ref()
        )
    })?;

    let number = captures[1]
        .parse::<usize>()
        .with_context(|| format!("Size '{}' is out of range.", str.as_ref()))?;
    let shift = match &captures[2] {
        "k" | "K" => 10,
        "m" | "M" => 20,
        "g" | "G" => 30,
        "t" | "T" => 40,
        _ => 0,
    };

    number
        .checked_mul(1usize << shift)
        .ok_or_else(|| anyhow::anyhow!("Size '{}' is out of range.", str.as_ref()))
}

/// Parses a duration expression like **500ms**, **5s** or **2 h**.
///
/// Accepted suffixes are **ms**, **s**, **m**, **h** and **d**. A plain number is treated as
/// milliseconds.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(ringcache::fmt::parse_duration("250").unwrap(), Duration::from_millis(250));
/// assert_eq!(ringcache::fmt::parse_duration("100 ms").unwrap(), Duration::from_millis(100));
/// assert_eq!(ringcache::fmt::parse_duration("10s").unwrap(), Duration::from_secs(10));
/// assert_eq!(ringcache::fmt::parse_duration("3 M").unwrap(), Duration::from_secs(180));
/// assert_eq!(ringcache::fmt::parse_duration("1d").unwrap(), Duration::from_secs(86_400));
///
/// assert_eq!(ringcache::fmt::parse_duration("3 Y").is_err(), true);
/// assert_eq!(ringcache::fmt::parse_duration("-1m").is_err(), true);
/// assert_eq!(ringcache::fmt::parse_duration("999999999999999999d").is_err(), true);
/// ```
pub fn parse_duration(str: impl AsRef<str>) -> anyhow::Result<Duration> {
    lazy_static::lazy_static! {
        static ref NUMBER_AND_SUFFIX: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *((ms|s|m|h|d|MS|S|M|H|D)?) *$").unwrap();
    }

    let captures = NUMBER_AND_SUFFIX.captures(str.as_ref()).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a duration. \
             Expected a positive number and optionally 'ms', 's', 'm', 'h' or 'd' as suffix.",
            str.as_ref()
        )
    })?;

    let number = captures[1]
        .parse::<u64>()
        .with_context(|| format!("Duration '{}' is out of range.", str.as_ref()))?;

    let seconds = match &captures[2] {
        "s" | "S" => Some(number),
        "m" | "M" => number.checked_mul(60),
        "h" | "H" => number.checked_mul(60 * 60),
        "d" | "D" => number.checked_mul(60 * 60 * 24),
        _ => return Ok(Duration::from_millis(number)),
    };

    seconds
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow::anyhow!("Duration '{}' is out of range.", str.as_ref()))
}

/// Formats a duration into a string like "1m 2s 13ms".
///
/// Zero components are skipped. A zero duration is rendered as "0ms".
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(ringcache::fmt::format_duration(Duration::from_millis(0)), "0ms");
/// assert_eq!(ringcache::fmt::format_duration(Duration::from_millis(62_013)), "1m 2s 13ms");
/// assert_eq!(ringcache::fmt::format_duration(Duration::from_secs(10)), "10s");
/// assert_eq!(ringcache::fmt::format_duration(Duration::from_secs(90_060)), "1d 1h 1m");
/// ```
pub fn format_duration(duration: Duration) -> String {
    const STEPS: [(u128, &str); 5] = [
        (1000 * 60 * 60 * 24, "d"),
        (1000 * 60 * 60, "h"),
        (1000 * 60, "m"),
        (1000, "s"),
        (1, "ms"),
    ];

    let mut value = duration.as_millis();
    if value == 0 {
        return "0ms".to_owned();
    }

    let mut result = String::new();
    for (millis, suffix) in STEPS {
        let amount = value / millis;
        if amount > 0 {
            if !result.is_empty() {
                result.push(' ');
            }
            let _ = write!(result, "{}{}", amount, suffix);
            value %= millis;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::fmt::{format_size, parse_duration, parse_size};

    #[test]
    fn sizes_survive_formatting_in_the_common_cases() {
        assert_eq!(parse_size("2k").unwrap(), 2 << 10);
        assert_eq!(format_size(parse_size("64m").unwrap()), "64.0 MiB");
        assert_eq!(format_size(parse_size("1g").unwrap()), "1024 MiB");
    }

    #[test]
    fn oversized_values_are_rejected() {
        assert_eq!(parse_size("99999999999999999999999").is_err(), true);
        assert_eq!(parse_size("9999999999999999t").is_err(), true);
    }

    #[test]
    fn oversized_durations_are_rejected() {
        assert_eq!(parse_duration("999999999999999999d").is_err(), true);
        assert_eq!(parse_duration("999999999999999999h").is_err(), true);
        assert_eq!(parse_duration("99999999999999999999").is_err(), true);
        assert_eq!(
            parse_duration("10000d").unwrap(),
            Duration::from_secs(864_000_000)
        );
    }
}
