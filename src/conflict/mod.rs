//! Time-conflict encoding.
//!
//! A meeting expands to the cross product of its terms, days and periods. Two sections that
//! share any [TimeSlotToken] overlap in time and cannot both be scheduled.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize, Serializer};
use tracing::warn;

use crate::data::course::{parse_clock_time, Course, Meeting};

/// Meetings longer than this occupy a second period.
const LONG_MEETING_MINUTES: i64 = 120;
/// Offset from the start time used to find the second period of a long meeting.
const SECOND_PERIOD_OFFSET_MINUTES: i64 = 105;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSlotToken {
    pub term: String,
    pub day: String,
    pub period: String,
}

impl fmt::Display for TimeSlotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.term, self.day, self.period)
    }
}

impl Serialize for TimeSlotToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Lookup tables for the encoder. Overridable from the YAML config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderTables {
    /// Part-of-term code to quarter codes.
    pub term_mapping: BTreeMap<String, Vec<String>>,
    /// Day pattern to single days.
    pub days_mapping: BTreeMap<String, Vec<String>>,
    /// Start time to period letter. Keys are written `HH:MM` or `HH:MM:SS`.
    #[serde(with = "clock_keys")]
    pub time_mapping: BTreeMap<NaiveTime, String>,
    /// Period for start times missing from `time_mapping`.
    pub unclassified_period: String,
}

mod clock_keys {
    use std::collections::BTreeMap;

    use chrono::NaiveTime;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::parse_clock_time;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<NaiveTime, String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            map.iter()
                .map(|(time, period)| (time.format("%H:%M:%S").to_string(), period)),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<NaiveTime, String>, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, period)| {
                parse_clock_time(&key)
                    .map(|time| (time, period))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for EncoderTables {
    fn default() -> Self {
        let term_mapping = [
            ("1", owned(&["q1"])),
            ("2", owned(&["q2"])),
            ("3", owned(&["q3"])),
            ("4", owned(&["q4"])),
            ("F", owned(&["q1", "q2"])),
            ("S", owned(&["q3", "q4"])),
            ("M", owned(&["mod"])),
            ("Modular", owned(&["mod"])),
        ];
        let days_mapping = [
            ("M", owned(&["M"])),
            ("T", owned(&["T"])),
            ("W", owned(&["W"])),
            ("R", owned(&["R"])),
            ("F", owned(&["F"])),
            ("S", owned(&["S"])),
            ("U", owned(&["U"])),
            ("MW", owned(&["M", "W"])),
            ("TR", owned(&["T", "R"])),
            ("FS", owned(&["F", "S"])),
            ("TBA", owned(&["TBA"])),
        ];
        let time_mapping = [
            (8, 30, "A"),
            (10, 15, "B"),
            (12, 0, "C"),
            (13, 45, "D"),
            (15, 30, "E"),
            (17, 15, "F"),
            (19, 0, "G"),
            (20, 45, "H"),
            (22, 30, "I"),
            (0, 0, "Z"),
        ];

        Self {
            term_mapping: term_mapping
                .into_iter()
                .map(|(code, terms)| (code.to_string(), terms))
                .collect(),
            days_mapping: days_mapping
                .into_iter()
                .map(|(code, days)| (code.to_string(), days))
                .collect(),
            time_mapping: time_mapping
                .into_iter()
                .filter_map(|(hour, minute, period)| {
                    NaiveTime::from_hms_opt(hour, minute, 0).map(|time| (time, period.to_string()))
                })
                .collect(),
            unclassified_period: "Z".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConflictEncoder {
    tables: EncoderTables,
}

impl ConflictEncoder {
    pub fn new(tables: EncoderTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &EncoderTables {
        &self.tables
    }

    /// Unmapped term codes stand for themselves.
    pub fn terms(&self, term_part: &str) -> Vec<String> {
        self.tables
            .term_mapping
            .get(term_part)
            .cloned()
            .unwrap_or_else(|| vec![term_part.to_string()])
    }

    /// Unmapped day codes stand for themselves, so they only conflict with the same raw code.
    pub fn days(&self, days_code: &str) -> Vec<String> {
        self.tables
            .days_mapping
            .get(days_code)
            .cloned()
            .unwrap_or_else(|| vec![days_code.to_string()])
    }

    pub fn is_known_day_code(&self, days_code: &str) -> bool {
        self.tables.days_mapping.contains_key(days_code)
    }

    /// Exact match on the start time, seconds included.
    pub fn period_of(&self, start: NaiveTime) -> String {
        self.tables
            .time_mapping
            .get(&start)
            .cloned()
            .unwrap_or_else(|| self.tables.unclassified_period.clone())
    }

    /// One period, or two when the meeting runs past two hours.
    pub fn periods(&self, meeting: &Meeting) -> Vec<String> {
        let mut periods = vec![self.period_of(meeting.start_time)];
        if meeting.duration_minutes() > LONG_MEETING_MINUTES {
            let (second_start, _) = meeting
                .start_time
                .overflowing_add_signed(Duration::minutes(SECOND_PERIOD_OFFSET_MINUTES));
            let second = self.period_of(second_start);
            if !periods.contains(&second) {
                periods.push(second);
            }
        }
        periods
    }

    pub fn tokens(&self, meeting: &Meeting) -> BTreeSet<TimeSlotToken> {
        let terms = self.terms(&meeting.term_part);
        let days = self.days(&meeting.days_code);
        let periods = self.periods(meeting);

        let mut tokens = BTreeSet::new();
        for term in &terms {
            for day in &days {
                for period in &periods {
                    tokens.insert(TimeSlotToken {
                        term: term.clone(),
                        day: day.clone(),
                        period: period.clone(),
                    });
                }
            }
        }
        tokens
    }
}

/// Tokens for every course, computed once and then only read.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    encoder: ConflictEncoder,
    tokens: HashMap<u32, BTreeSet<TimeSlotToken>>,
}

impl TokenCache {
    pub fn build(courses: &[Course], encoder: &ConflictEncoder) -> Self {
        let mut unknown_days: BTreeSet<&str> = BTreeSet::new();
        let mut tokens = HashMap::with_capacity(courses.len());
        for course in courses {
            let days_code = course.meeting.days_code.as_str();
            if !encoder.is_known_day_code(days_code) && unknown_days.insert(days_code) {
                warn!(
                    days_code,
                    course = course.id,
                    "unrecognised days code; it only conflicts with sections using the same code"
                );
            }
            tokens.insert(course.id, encoder.tokens(&course.meeting));
        }
        Self {
            encoder: encoder.clone(),
            tokens,
        }
    }

    pub fn get(&self, id: u32) -> Option<&BTreeSet<TimeSlotToken>> {
        self.tokens.get(&id)
    }

    /// Cached tokens for `course`, or freshly encoded ones for a course built after the cache.
    pub fn tokens_for(&self, course: &Course) -> BTreeSet<TimeSlotToken> {
        match self.tokens.get(&course.id) {
            Some(tokens) => tokens.clone(),
            None => self.encoder.tokens(&course.meeting),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
