//! Time-of-day salutation that opens the survey.

use chrono::Timelike;

pub const MORNING: &str = "¡Buenos días!";
pub const AFTERNOON: &str = "¡Buenas tardes!";
pub const EVENING: &str = "¡Buenas noches!";

/// Salutation for the given wall-clock time.
///
/// [05:00, 12:00) morning, [12:00, 19:00) afternoon, anything else evening.
pub fn greeting_prefix<T: Timelike>(now: &T) -> &'static str {
    match now.hour() {
        5..=11 => MORNING,
        12..=18 => AFTERNOON,
        _ => EVENING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn mid_band_hours() {
        assert_eq!(greeting_prefix(&at(9, 0)), MORNING);
        assert_eq!(greeting_prefix(&at(15, 0)), AFTERNOON);
        assert_eq!(greeting_prefix(&at(22, 0)), EVENING);
    }

    #[test]
    fn band_edges() {
        assert_eq!(greeting_prefix(&at(4, 59)), EVENING);
        assert_eq!(greeting_prefix(&at(5, 0)), MORNING);
        assert_eq!(greeting_prefix(&at(11, 59)), MORNING);
        assert_eq!(greeting_prefix(&at(12, 0)), AFTERNOON);
        assert_eq!(greeting_prefix(&at(18, 59)), AFTERNOON);
        assert_eq!(greeting_prefix(&at(19, 0)), EVENING);
        assert_eq!(greeting_prefix(&at(0, 0)), EVENING);
    }

    #[test]
    fn works_with_full_datetimes() {
        let dt = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(13, 30, 0)
            .unwrap();
        assert_eq!(greeting_prefix(&dt), AFTERNOON);
    }
}
