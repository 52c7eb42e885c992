pub use shared::event::MAX_DURATION_MINUTES;

use crate::validate::Rejection;

/// Parses a session length into minutes.
///
/// Accepts a bare number of minutes (`"45"`) or hour/minute tokens in that
/// order (`"1h 30m"`, `"1h30m"`, `"2 hours"`, `"45min"`).
pub fn parse_duration_minutes(raw: &str) -> Result<u32, Rejection> {
    let input = raw.trim().to_ascii_lowercase();
    if input.is_empty() {
        return Err(Rejection::InvalidDuration);
    }

    let minutes = if input.bytes().all(|byte| byte.is_ascii_digit()) {
        input
            .parse::<u32>()
            .map_err(|_| Rejection::InvalidDuration)?
    } else {
        parse_unit_tokens(&input)?
    };

    if minutes == 0 || minutes > MAX_DURATION_MINUTES {
        return Err(Rejection::DurationOutOfRange);
    }
    Ok(minutes)
}

fn parse_unit_tokens(input: &str) -> Result<u32, Rejection> {
    let mut rest = input;
    let mut hours: Option<u32> = None;
    let mut minutes: Option<u32> = None;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(Rejection::InvalidDuration);
        }
        let value = rest[..digits_end]
            .parse::<u32>()
            .map_err(|_| Rejection::InvalidDuration)?;
        rest = rest[digits_end..].trim_start();

        let unit_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = rest[unit_end..].trim_start();

        match unit {
            "h" | "hr" | "hrs" | "hour" | "hours" if hours.is_none() && minutes.is_none() => {
                hours = Some(value);
            }
            "m" | "min" | "mins" | "minute" | "minutes" if minutes.is_none() => {
                minutes = Some(value);
            }
            _ => return Err(Rejection::InvalidDuration),
        }
    }

    hours
        .unwrap_or(0)
        .checked_mul(60)
        .and_then(|from_hours| from_hours.checked_add(minutes.unwrap_or(0)))
        .ok_or(Rejection::DurationOutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_hours_and_minutes() {
        assert_eq!(parse_duration_minutes("1h 30m"), Ok(90));
        assert_eq!(parse_duration_minutes("1h30m"), Ok(90));
        assert_eq!(parse_duration_minutes("2 hours 5 min"), Ok(125));
        assert_eq!(parse_duration_minutes(" 2H "), Ok(120));
    }

    #[test]
    fn bare_number_is_minutes() {
        assert_eq!(parse_duration_minutes("45"), Ok(45));
        assert_eq!(parse_duration_minutes("45m"), Ok(45));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration_minutes("abc"), Err(Rejection::InvalidDuration));
        assert_eq!(parse_duration_minutes(""), Err(Rejection::InvalidDuration));
        assert_eq!(parse_duration_minutes("1.5h"), Err(Rejection::InvalidDuration));
        assert_eq!(parse_duration_minutes("30m 1h"), Err(Rejection::InvalidDuration));
        assert_eq!(parse_duration_minutes("1h 1h"), Err(Rejection::InvalidDuration));
        assert_eq!(parse_duration_minutes("1h 30"), Err(Rejection::InvalidDuration));
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(parse_duration_minutes("0"), Err(Rejection::DurationOutOfRange));
        assert_eq!(parse_duration_minutes("25h"), Err(Rejection::DurationOutOfRange));
        assert_eq!(
            parse_duration_minutes("99999999999h"),
            Err(Rejection::InvalidDuration)
        );
    }
}
