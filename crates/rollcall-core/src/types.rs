use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// ISO-8601 calendar date format used for `AttendanceRecord::date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Zero-padded 24h format used for `AttendanceRecord::time` (lexicographically sortable).
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("student id must not be empty")]
    EmptyStudentId,
    #[error("student name must not be empty")]
    EmptyStudentName,
    #[error("confidence {0} is outside 0..=100")]
    ConfidenceOutOfRange(f64),
    #[error("invalid date {0:?}: expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid time {0:?}: expected HH:MM:SS")]
    InvalidTime(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown capture method {0:?} (expected face, fingerprint or motion)")]
    Method(String),
    #[error("unknown attendance status {0:?} (expected present, late or absent)")]
    Status(String),
}

/// Biometric method a record was captured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Face,
    Fingerprint,
    Motion,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Face, Method::Fingerprint, Method::Motion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Face => "face",
            Method::Fingerprint => "fingerprint",
            Method::Motion => "motion",
        }
    }

    /// Capitalized form ("Face", "Fingerprint", "Motion").
    pub fn display_name(&self) -> &'static str {
        match self {
            Method::Face => "Face",
            Method::Fingerprint => "Fingerprint",
            Method::Motion => "Motion",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "face" => Ok(Method::Face),
            "fingerprint" => Ok(Method::Fingerprint),
            "motion" => Ok(Method::Motion),
            _ => Err(ParseError::Method(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Present,
    Late,
    Absent,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::Late => "late",
            Status::Absent => "absent",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Status::Present),
            "late" => Ok(Status::Late),
            "absent" => Ok(Status::Absent),
            _ => Err(ParseError::Status(s.to_string())),
        }
    }
}

/// Who a recognizer believes was in front of the sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub student_id: String,
    pub student_name: String,
    pub class: String,
}

/// Decision reported by a recognizer for one capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOutcome {
    /// Best candidate, if the recognizer produced one.
    pub identity: Option<Identity>,
    /// Confidence in percent.
    pub confidence: f64,
}

impl RecognitionOutcome {
    pub fn matched(identity: Identity, confidence: f64) -> Self {
        Self {
            identity: Some(identity),
            confidence,
        }
    }

    pub fn no_match() -> Self {
        Self {
            identity: None,
            confidence: 0.0,
        }
    }
}

/// One attendance fact. Never mutated once stored; corrections are new records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    pub student_name: String,
    pub class: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    /// `HH:MM:SS`, local time.
    pub time: String,
    pub method: Method,
    /// Percent, `0.0..=100.0`.
    pub confidence: f64,
    pub status: Status,
}

impl AttendanceRecord {
    /// Build a record for a recognized identity at the given local timestamp.
    pub fn from_identity(
        identity: &Identity,
        confidence: f64,
        method: Method,
        status: Status,
        at: NaiveDateTime,
    ) -> Self {
        Self {
            student_id: identity.student_id.clone(),
            student_name: identity.student_name.clone(),
            class: identity.class.clone(),
            date: at.format(DATE_FORMAT).to_string(),
            time: at.format(TIME_FORMAT).to_string(),
            method,
            confidence,
            status,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.student_id.trim().is_empty() {
            return Err(ValidationError::EmptyStudentId);
        }
        if self.student_name.trim().is_empty() {
            return Err(ValidationError::EmptyStudentName);
        }
        // NaN fails the range check as well.
        if !(0.0..=100.0).contains(&self.confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(self.confidence));
        }
        parse_date(&self.date)?;
        Ok(())
    }
}

/// Strict `YYYY-MM-DD` parse: chrono alone accepts unpadded fields, so the
/// value must also survive a format round-trip unchanged.
pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    let date = NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate(s.to_string()))?;
    if date.format(DATE_FORMAT).to_string() != s {
        return Err(ValidationError::InvalidDate(s.to_string()));
    }
    Ok(date)
}

/// Strict zero-padded `HH:MM:SS` parse, same round-trip rule as `parse_date`.
pub fn parse_time(s: &str) -> Result<NaiveTime, ValidationError> {
    let time = NaiveTime::parse_from_str(s, TIME_FORMAT)
        .map_err(|_| ValidationError::InvalidTime(s.to_string()))?;
    if time.format(TIME_FORMAT).to_string() != s {
        return Err(ValidationError::InvalidTime(s.to_string()));
    }
    Ok(time)
}

#[cfg(test)]
pub(crate) fn sample_record() -> AttendanceRecord {
    AttendanceRecord {
        student_id: "ST001234".into(),
        student_name: "Emma Thompson".into(),
        class: "10-A".into(),
        date: "2024-01-15".into(),
        time: "08:15:30".into(),
        method: Method::Face,
        confidence: 98.5,
        status: Status::Present,
    }
}
