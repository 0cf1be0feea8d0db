use std::fmt;

use chrono::{Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostureStatus {
    Good,
    Bad,
}

impl fmt::Display for PostureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PostureStatus::Good => "good",
            PostureStatus::Bad => "bad",
        })
    }
}

/// One classified record, as stored in the history log.
///
/// Serialises to `{"time": "HH:MM:SS", "status": "good", "pressure": "6012.5"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureEvent {
    #[serde(with = "clock_time")]
    pub time: NaiveTime,
    pub status: PostureStatus,
    #[serde(with = "pressure_text")]
    pub pressure: f64,
}

impl PostureEvent {
    pub fn new(time: NaiveTime, status: PostureStatus, pressure: f64) -> Self {
        Self {
            time: truncate_to_second(time),
            status,
            pressure,
        }
    }

    pub fn time_label(&self) -> String {
        self.time.format(clock_time::FORMAT).to_string()
    }

    /// Pressure the way the status line shows it, one decimal place.
    pub fn pressure_label(&self) -> String {
        format!("{:.1}", self.pressure)
    }
}

/// Wall-clock time of day, whole seconds.
pub fn now_time() -> NaiveTime {
    truncate_to_second(Local::now().time())
}

fn truncate_to_second(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M:%S";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Pressure travels as a one-decimal string like "5890.0". Numbers are accepted on read.
mod pressure_text {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
    }

    pub fn serialize<S: Serializer>(pressure: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("{pressure:.1}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(value),
            Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn serialises_in_log_format() {
        let event = PostureEvent::new(at(9, 5, 3), PostureStatus::Bad, 5999.9);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"time": "09:05:03", "status": "bad", "pressure": "5999.9"})
        );
    }

    #[test]
    fn pressure_is_written_with_one_decimal() {
        let whole = PostureEvent::new(at(1, 2, 3), PostureStatus::Good, 6000.0);
        assert_eq!(
            serde_json::to_string(&whole).unwrap(),
            r#"{"time":"01:02:03","status":"good","pressure":"6000.0"}"#
        );

        let noisy = PostureEvent::new(at(1, 2, 4), PostureStatus::Bad, 0.1 + 0.2);
        let json = serde_json::to_value(&noisy).unwrap();
        assert_eq!(json["pressure"], "0.3");
        assert_eq!(json["pressure"].as_str(), Some(noisy.pressure_label().as_str()));
    }

    #[test]
    fn reads_legacy_entries() {
        let event: PostureEvent =
            serde_json::from_str(r#"{"time": "14:30:00", "status": "good", "pressure": "6120.0"}"#)
                .unwrap();
        assert_eq!(event, PostureEvent::new(at(14, 30, 0), PostureStatus::Good, 6120.0));

        let numeric: PostureEvent =
            serde_json::from_str(r#"{"time": "14:30:01", "status": "bad", "pressure": 12}"#)
                .unwrap();
        assert_eq!(numeric.pressure, 12.0);
    }

    #[test]
    fn drops_sub_second_precision() {
        let precise = NaiveTime::from_hms_milli_opt(10, 0, 0, 750).unwrap();
        let event = PostureEvent::new(precise, PostureStatus::Good, 1.0);
        assert_eq!(event.time, at(10, 0, 0));
        assert_eq!(event.time_label(), "10:00:00");
        assert_eq!(event.pressure_label(), "1.0");
    }
}
