//! Anchors: fixed calendar commitments the day is planned around.
//!
//! Anchors are owned by calendar ingestion and are never modified here.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AnchorSourceError;

/// Kind of commitment. Selects the preparation chain template.
///
/// Unrecognised strings are kept verbatim in `Custom` so the registry can
/// still resolve config-defined templates, or fall back to "other".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnchorType {
    Class,
    Lecture,
    Seminar,
    Workshop,
    Exam,
    Meeting,
    Appointment,
    Work,
    Other,
    Custom(String),
}

impl AnchorType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Class => "class",
            Self::Lecture => "lecture",
            Self::Seminar => "seminar",
            Self::Workshop => "workshop",
            Self::Exam => "exam",
            Self::Meeting => "meeting",
            Self::Appointment => "appointment",
            Self::Work => "work",
            Self::Other => "other",
            Self::Custom(raw) => raw.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "class" => Self::Class,
            "lecture" => Self::Lecture,
            "seminar" => Self::Seminar,
            "workshop" => Self::Workshop,
            "exam" => Self::Exam,
            "meeting" => Self::Meeting,
            "appointment" => Self::Appointment,
            "work" => Self::Work,
            "other" => Self::Other,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for AnchorType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<AnchorType> for String {
    fn from(kind: AnchorType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for AnchorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed calendar commitment with immutable start/end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub anchor_type: AnchorType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
}

impl Anchor {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        anchor_type: AnchorType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            anchor_type,
            start,
            end,
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Location with blank strings treated as missing.
    pub fn location(&self) -> Option<&str> {
        self.location
            .as_deref()
            .map(str::trim)
            .filter(|loc| !loc.is_empty())
    }
}

/// Calendar ingestion collaborator.
#[async_trait]
pub trait AnchorSource: Send + Sync {
    /// Anchors starting on `date`, in calendar order.
    async fn anchors_for(&self, date: NaiveDate) -> Result<Vec<Anchor>, AnchorSourceError>;
}

/// In-memory anchor list, filtered by start date.
#[derive(Debug, Clone, Default)]
pub struct StaticAnchorSource {
    anchors: Vec<Anchor>,
}

impl StaticAnchorSource {
    pub fn new(anchors: Vec<Anchor>) -> Self {
        Self { anchors }
    }
}

#[async_trait]
impl AnchorSource for StaticAnchorSource {
    async fn anchors_for(&self, date: NaiveDate) -> Result<Vec<Anchor>, AnchorSourceError> {
        let mut anchors: Vec<Anchor> = self
            .anchors
            .iter()
            .filter(|a| a.start.date_naive() == date)
            .cloned()
            .collect();
        anchors.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(anchors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn anchor_type_parses_case_insensitively() {
        assert_eq!(AnchorType::parse("Lecture"), AnchorType::Lecture);
        assert_eq!(AnchorType::parse(" SEMINAR "), AnchorType::Seminar);
        assert_eq!(
            AnchorType::parse("yoga"),
            AnchorType::Custom("yoga".to_string())
        );
    }

    #[test]
    fn anchor_deserializes_type_field() {
        let json = r#"{
            "id": "a1",
            "title": "Algorithms",
            "type": "lecture",
            "start": "2026-10-19T10:00:00Z",
            "end": "2026-10-19T12:00:00Z",
            "location": "Hall B"
        }"#;
        let anchor: Anchor = serde_json::from_str(json).unwrap();
        assert_eq!(anchor.anchor_type, AnchorType::Lecture);
        assert_eq!(anchor.duration_minutes(), 120);
        assert_eq!(anchor.location(), Some("Hall B"));
    }

    #[test]
    fn blank_location_is_missing() {
        let start = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let anchor = Anchor::new("a", "A", AnchorType::Meeting, start, start)
            .with_location("   ");
        assert_eq!(anchor.location(), None);
    }

    #[tokio::test]
    async fn static_source_filters_by_date_and_sorts() {
        let day = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        let late = Anchor::new(
            "late",
            "Late",
            AnchorType::Meeting,
            day + chrono::Duration::hours(15),
            day + chrono::Duration::hours(16),
        );
        let early = Anchor::new(
            "early",
            "Early",
            AnchorType::Lecture,
            day + chrono::Duration::hours(9),
            day + chrono::Duration::hours(10),
        );
        let tomorrow = Anchor::new(
            "tomorrow",
            "Tomorrow",
            AnchorType::Lecture,
            day + chrono::Duration::hours(33),
            day + chrono::Duration::hours(34),
        );
        let source = StaticAnchorSource::new(vec![late, early, tomorrow]);

        let anchors = source.anchors_for(day.date_naive()).await.unwrap();
        let ids: Vec<_> = anchors.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }
}
