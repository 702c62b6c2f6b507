/// Utility functions for local time handling and formatting
use std::any::Any;
use std::sync::OnceLock;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Capture the local UTC offset.
///
/// Must run before any other thread is spawned: the `time` crate refuses to
/// read the offset from a multi-threaded process. Falls back to UTC.
pub fn init_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

/// Current wall-clock time in the station's local offset
pub fn now_local() -> OffsetDateTime {
    let offset = LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc().to_offset(offset)
}

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to YYYY-MM-DD HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    dt.format(format).unwrap_or_else(|_| dt.to_string())
}

/// ISO-8601 timestamp used in the first column of data files
pub fn format_timestamp(dt: &OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    dt.format(format).unwrap_or_else(|_| dt.to_string())
}

/// `YYYY-MM-DD` stamp used in file names and the rainfall totals
pub fn date_stamp(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    date.format(format).unwrap_or_else(|_| date.to_string())
}

pub fn parse_date_stamp(text: &str) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(text, format).ok()
}

/// Text of a caught panic payload, for logging
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn test_formats() {
        let dt = datetime!(2024-06-01 08:05:09 +05:00);
        assert_eq!(format_datetime(&dt), "2024-06-01 08:05:09");
        assert_eq!(format_timestamp(&dt), "2024-06-01T08:05:09");
        assert_eq!(date_stamp(date!(2024 - 06 - 01)), "2024-06-01");
    }

    #[test]
    fn test_parse_date_stamp() {
        assert_eq!(parse_date_stamp("2024-12-31"), Some(date!(2024 - 12 - 31)));
        assert_eq!(parse_date_stamp("2024-13-01"), None);
        assert_eq!(parse_date_stamp("backup"), None);
    }

    #[test]
    fn test_panic_message() {
        let literal = std::panic::catch_unwind(|| panic!("frame too short")).unwrap_err();
        assert_eq!(panic_message(literal.as_ref()), "frame too short");

        let formatted = std::panic::catch_unwind(|| panic!("left: {} right: {}", 1, 3)).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "left: 1 right: 3");

        let opaque = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(opaque.as_ref()), "unknown panic");
    }
}
