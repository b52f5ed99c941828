//! Timestamp formats used in reports
//!
//! Trials carry microsecond precision (`2000/01/01 00:00:00.000000`), summary
//! times are truncated to seconds (`2000/01/01 00:00:00`).

use chrono::NaiveDateTime;

/// Format of `Trial::request_time`
pub const TRIAL_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.6f";

/// Format of the summary start and end times
pub const SUMMARY_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Format a trial request time
pub fn format_trial_time(time: &NaiveDateTime) -> String {
    time.format(TRIAL_TIME_FORMAT).to_string()
}

/// Format a summary time
pub fn format_summary_time(time: &NaiveDateTime) -> String {
    time.format(SUMMARY_TIME_FORMAT).to_string()
}

macro_rules! time_serde {
    ($module:ident, $format:expr) => {
        /// Serde adapter for this timestamp format
        pub mod $module {
            use chrono::NaiveDateTime;
            use serde::{de::Error, Deserialize, Deserializer, Serializer};

            pub fn serialize<S>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.collect_str(&time.format($format))
            }

            pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                NaiveDateTime::parse_from_str(&raw, $format).map_err(D::Error::custom)
            }
        }
    };
}

time_serde!(trial_time, super::TRIAL_TIME_FORMAT);
time_serde!(summary_time, super::SUMMARY_TIME_FORMAT);
