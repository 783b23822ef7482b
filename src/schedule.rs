//! Weekly occupancy windows consumed by strategies.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// Answers "is the building occupied right now".
///
/// Implemented here by [`WeeklySchedule`]; hosts with richer scheduling
/// (calendar exceptions, holiday tables) can supply their own implementation.
pub trait OccupancyOracle: Send + Sync {
    /// Returns `true` when `now` falls inside an occupied window.
    fn is_occupied(&self, now: NaiveDateTime) -> bool;
}

/// One weekday's occupancy window. `None` start or end means the building is
/// never occupied that day.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DayWindow {
    /// Occupied-from time, `"HH:MM"`.
    #[serde(default, deserialize_with = "de_opt_hhmm")]
    pub start: Option<NaiveTime>,
    /// Occupied-until time, `"HH:MM"` (exclusive).
    #[serde(default, deserialize_with = "de_opt_hhmm")]
    pub end: Option<NaiveTime>,
}

impl DayWindow {
    /// A window spanning `start..end` on the hour/minute.
    pub fn between(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    fn contains(&self, time: NaiveTime) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= time && time < end,
            _ => false,
        }
    }
}

fn de_opt_hhmm<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| {
        NaiveTime::parse_from_str(&s, "%H:%M")
            .map_err(|e| serde::de::Error::custom(format!("invalid time \"{s}\": {e}")))
    })
    .transpose()
}

/// Per-weekday occupancy table.
///
/// Loadable from TOML, with absent days defaulting to unoccupied:
///
/// ```toml
/// monday = { start = "07:00", end = "17:00" }
/// saturday = { }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeeklySchedule {
    #[serde(default)]
    pub monday: DayWindow,
    #[serde(default)]
    pub tuesday: DayWindow,
    #[serde(default)]
    pub wednesday: DayWindow,
    #[serde(default)]
    pub thursday: DayWindow,
    #[serde(default)]
    pub friday: DayWindow,
    #[serde(default)]
    pub saturday: DayWindow,
    #[serde(default)]
    pub sunday: DayWindow,
}

impl WeeklySchedule {
    /// The conventional default: Monday through Friday, 07:00 to 17:00.
    pub fn business_hours() -> Self {
        let window = DayWindow::between(hhmm(7, 0), hhmm(17, 0));
        Self {
            monday: window.clone(),
            tuesday: window.clone(),
            wednesday: window.clone(),
            thursday: window.clone(),
            friday: window,
            saturday: DayWindow::default(),
            sunday: DayWindow::default(),
        }
    }

    /// Parses a schedule from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or a time is malformed.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let schedule: Self =
            toml::from_str(s).map_err(|e| ConfigError::new("schedule", e.to_string()))?;
        if let Some(err) = schedule.validate().into_iter().next() {
            return Err(err);
        }
        Ok(schedule)
    }

    /// Validates all windows and returns a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        for (name, window) in self.days() {
            if let (Some(start), Some(end)) = (window.start, window.end) {
                if start >= end {
                    errors.push(ConfigError::new(
                        format!("{name}.start"),
                        "must be earlier than end",
                    ));
                }
            }
        }
        errors
    }

    fn days(&self) -> [(&'static str, &DayWindow); 7] {
        [
            ("monday", &self.monday),
            ("tuesday", &self.tuesday),
            ("wednesday", &self.wednesday),
            ("thursday", &self.thursday),
            ("friday", &self.friday),
            ("saturday", &self.saturday),
            ("sunday", &self.sunday),
        ]
    }

    fn window_for(&self, weekday: Weekday) -> &DayWindow {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }
}

impl OccupancyOracle for WeeklySchedule {
    fn is_occupied(&self, now: NaiveDateTime) -> bool {
        self.window_for(now.weekday()).contains(now.time())
    }
}

fn hhmm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}
