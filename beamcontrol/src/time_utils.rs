//! HH:MM:SS time handling for AVTransport Seek/GetPositionInfo.

use anyhow::{anyhow, Result};

/// Formats seconds as zero-padded `HH:MM:SS`, integer-second precision.
pub fn format_hhmmss(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// Parses `HH:MM:SS` (or `H:MM:SS`) into seconds.
///
/// Some renderers report fractional seconds (`00:04:07.500`); the fraction
/// is accepted and kept.
pub fn parse_hhmmss(value: &str) -> Result<f64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(anyhow!("Invalid time format: {}", value));
    }
    let hours: f64 = parts[0]
        .parse()
        .map_err(|_| anyhow!("Invalid hours in time: {}", value))?;
    let minutes: f64 = parts[1]
        .parse()
        .map_err(|_| anyhow!("Invalid minutes in time: {}", value))?;
    let seconds: f64 = parts[2]
        .parse()
        .map_err(|_| anyhow!("Invalid seconds in time: {}", value))?;
    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_zero_pads() {
        assert_eq!(format_hhmmss(0.0), "00:00:00");
        assert_eq!(format_hhmmss(61.9), "00:01:01");
        assert_eq!(format_hhmmss(3600.0 + 23.0 * 60.0 + 45.0), "01:23:45");
    }

    #[test]
    fn parse_of_format_is_floor() {
        for t in [0.0, 0.4, 59.9, 60.0, 3599.5, 86399.0] {
            assert_eq!(parse_hhmmss(&format_hhmmss(t)).unwrap(), t.floor());
        }
    }

    #[test]
    fn parse_accepts_fractional_seconds() {
        assert_eq!(parse_hhmmss("00:04:07.500").unwrap(), 247.5);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_hhmmss("12:34").is_err());
        assert!(parse_hhmmss("aa:bb:cc").is_err());
    }
}
