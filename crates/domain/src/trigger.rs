use chrono::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum InvalidTriggerError {
    #[error("Malformed duration: {0}")]
    Malformed(String),
    #[error("Duration: {0} uses nominal years or months which are not supported for alarms")]
    NominalUnits(String),
}

/// Parses a signed iCalendar duration such as `-PT15M`, `P1D` or `-P1W`.
pub fn parse_duration(value: &str) -> Result<Duration, InvalidTriggerError> {
    let value = value.trim();
    let (negative, unsigned) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };

    let parsed = iso8601::duration(unsigned)
        .map_err(|_| InvalidTriggerError::Malformed(value.to_string()))?;
    if let iso8601::Duration::YMDHMS { year, month, .. } = parsed {
        if year != 0 || month != 0 {
            return Err(InvalidTriggerError::NominalUnits(value.to_string()));
        }
    }

    let std_duration: std::time::Duration = parsed.into();
    let duration = Duration::from_std(std_duration)
        .map_err(|_| InvalidTriggerError::Malformed(value.to_string()))?;

    Ok(if negative { -duration } else { duration })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_signed_durations() {
        assert_eq!(parse_duration("-PT15M").unwrap(), Duration::minutes(-15));
        assert_eq!(parse_duration("PT1H30M").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("+P1D").unwrap(), Duration::days(1));
        assert_eq!(parse_duration("-P1W").unwrap(), Duration::weeks(-1));
        assert_eq!(parse_duration("-P1DT2H").unwrap(), Duration::hours(-26));
        assert_eq!(parse_duration("PT0S").unwrap(), Duration::zero());
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(matches!(
            parse_duration("fifteen minutes"),
            Err(InvalidTriggerError::Malformed(_))
        ));
        assert!(parse_duration("").is_err());
        assert!(matches!(
            parse_duration("-P1M"),
            Err(InvalidTriggerError::NominalUnits(_))
        ));
    }
}
