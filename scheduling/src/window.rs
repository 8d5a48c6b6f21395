//! Component E, the Window Computer.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// The three canonical UTC intervals a sit-down moment implies.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Windows {
    pub start_of_day_utc: DateTime<Utc>,
    pub end_of_day_utc: DateTime<Utc>,
    pub window_floor_utc: DateTime<Utc>,
    pub start_of_day_str: String,
    pub end_of_day_str: String,
    pub window_floor_str: String,
    pub tz_offset_minutes: Option<i32>,
}

fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// If `local_tz_offset_minutes` is given, the local calendar day (at that offset) determines
/// `start_of_day_utc`; otherwise the UTC calendar day of `sit_down_utc` is used. Boundaries are
/// half-open: `window_floor_utc <= start_of_day_utc < end_of_day_utc`.
pub fn compute_windows(
    sit_down_utc: DateTime<Utc>,
    local_tz_offset_minutes: Option<i32>,
    acceptable_delinquency_window_days: i64,
) -> Windows {
    let start_of_day_utc = match local_tz_offset_minutes {
        Some(offset_minutes) => {
            let local = sit_down_utc + Duration::minutes(i64::from(offset_minutes));
            let local_midnight = local.date_naive().and_hms_opt(0, 0, 0).unwrap();
            Utc.from_utc_datetime(&local_midnight) - Duration::minutes(i64::from(offset_minutes))
        }
        None => {
            let midnight = sit_down_utc.date_naive().and_hms_opt(0, 0, 0).unwrap();
            Utc.from_utc_datetime(&midnight)
        }
    };
    let end_of_day_utc = start_of_day_utc + Duration::days(1);
    let window_floor_utc = start_of_day_utc - Duration::days(acceptable_delinquency_window_days);

    Windows {
        start_of_day_utc,
        end_of_day_utc,
        window_floor_utc,
        start_of_day_str: format_ts(start_of_day_utc),
        end_of_day_str: format_ts(end_of_day_utc),
        window_floor_str: format_ts(window_floor_utc),
        tz_offset_minutes: local_tz_offset_minutes,
    }
}
