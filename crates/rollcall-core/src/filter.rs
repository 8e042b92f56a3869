use crate::types::{AttendanceRecord, Method, ParseError};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MethodFilter {
    #[default]
    All,
    Only(Method),
}

impl MethodFilter {
    pub fn matches(&self, method: Method) -> bool {
        match self {
            MethodFilter::All => true,
            MethodFilter::Only(m) => *m == method,
        }
    }
}

impl FromStr for MethodFilter {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            Ok(MethodFilter::All)
        } else {
            s.parse().map(MethodFilter::Only)
        }
    }
}

/// Search over the record log.
///
/// `search` is a case-insensitive substring matched against the student name
/// OR the student id; the method filter is AND'd on top. An empty filter
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub search: String,
    pub method: MethodFilter,
}

impl RecordFilter {
    pub fn new(search: impl Into<String>, method: MethodFilter) -> Self {
        Self {
            search: search.into(),
            method,
        }
    }

    pub fn by_method(method: Method) -> Self {
        Self::new("", MethodFilter::Only(method))
    }

    pub fn by_search(search: impl Into<String>) -> Self {
        Self::new(search, MethodFilter::All)
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        let needle = self.search.to_lowercase();
        let matches_search = needle.is_empty()
            || record.student_name.to_lowercase().contains(&needle)
            || record.student_id.to_lowercase().contains(&needle);
        matches_search && self.method.matches(record.method)
    }
}
