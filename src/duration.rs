//! Human-readable timeouts such as `30s`, `500ms` or `2m`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

const UNITS: [(&str, u64); 4] = [("ms", 1), ("s", 1_000), ("m", 60_000), ("h", 3_600_000)];

/// Parse `<integer><unit>` where unit is `ms`, `s`, `m` or `h`.
///
/// ```
/// use progain::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    // `ms` must be tried before `m` and `s`.
    let Some((digits, millis_per_unit)) = UNITS
        .iter()
        .find_map(|(unit, factor)| s.strip_suffix(unit).map(|digits| (digits, *factor)))
    else {
        bail!("Duration {s:?} must end with ms, s, m or h");
    };
    let count: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in duration {s:?}"))?;
    let millis = count
        .checked_mul(millis_per_unit)
        .with_context(|| format!("Duration {s:?} is too large"))?;
    Ok(Duration::from_millis(millis))
}

/// Largest unit that divides the duration exactly.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis() as u64;
    let (unit, factor) = UNITS
        .iter()
        .rev()
        .find(|(_, factor)| millis >= *factor && millis % factor == 0)
        .copied()
        .unwrap_or(("ms", 1));
    format!("{}{unit}", millis / factor)
}

pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("750ms").unwrap(), Duration::from_millis(750));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration(" 1H ").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "30", "s", "1.5s", "-3s", "10d"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should not parse");
        }
        assert!(parse_duration(&format!("{}h", u64::MAX)).is_err());
    }

    #[test]
    fn formats_with_the_largest_exact_unit() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::ZERO), "0ms");
    }

    #[test]
    fn serde_helpers_use_the_text_form() {
        #[derive(Deserialize, Serialize)]
        struct Timeouts {
            #[serde(
                deserialize_with = "deserialize_duration",
                serialize_with = "serialize_duration"
            )]
            request: Duration,
        }

        let parsed: Timeouts = toml::from_str(r#"request = "45s""#).unwrap();
        assert_eq!(parsed.request, Duration::from_secs(45));
        assert_eq!(toml::to_string(&parsed).unwrap().trim(), r#"request = "45s""#);
    }
}
