//! Rendering of the sighting table

use std::fmt::Write as _;
use std::time::Duration;

use presence_core::{Sighting, Timestamp};
use serde::Serialize;

use crate::error::Result;

const FRESH_LIMIT: Duration = Duration::from_secs(10);
const RECENT_LIMIT: Duration = Duration::from_secs(60);

/// Coarse age of a sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeBucket {
    Fresh,
    Recent,
    Stale,
}

impl AgeBucket {
    pub fn from_age(age: Duration) -> Self {
        if age < FRESH_LIMIT {
            Self::Fresh
        } else if age < RECENT_LIMIT {
            Self::Recent
        } else {
            Self::Stale
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Recent => "recent",
            Self::Stale => "stale",
        }
    }
}

/// One presented line of the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SightingRow {
    pub identifier: String,
    pub username: Option<String>,
    pub signal_strength: i16,
    pub age_secs: u64,
    pub bucket: AgeBucket,
}

impl SightingRow {
    pub fn new(sighting: &Sighting, now: Timestamp) -> Self {
        let age = sighting.age(now);
        Self {
            identifier: sighting.identifier().to_string(),
            username: sighting.resolved_username().map(str::to_string),
            signal_strength: sighting.last_signal_strength(),
            age_secs: age.as_secs(),
            bucket: AgeBucket::from_age(age),
        }
    }
}

/// Prints the table as text or as JSON lines
#[derive(Debug, Clone, Copy, Default)]
pub struct Presenter {
    json: bool,
}

impl Presenter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Resolved sightings only; unresolved peers have nothing to show yet
    pub fn rows(sightings: &[Sighting], now: Timestamp) -> Vec<SightingRow> {
        sightings
            .iter()
            .filter(|sighting| sighting.is_resolved())
            .map(|sighting| SightingRow::new(sighting, now))
            .collect()
    }

    pub fn render(&self, sightings: &[Sighting], now: Timestamp) -> Result<String> {
        let rows = Self::rows(sightings, now);
        if self.json {
            let lines = rows
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            return Ok(lines.join("\n"));
        }

        let mut out = String::new();
        let _ = writeln!(out, "{:<20} {:>5}  {:<7} {}", "NAME", "RSSI", "SEEN", "PEER");
        for row in &rows {
            let _ = writeln!(
                out,
                "{:<20} {:>5}  {:<7} {}",
                row.username.as_deref().unwrap_or("?"),
                row.signal_strength,
                row.bucket.label(),
                row.identifier
            );
        }
        let _ = write!(out, "{} nearby", rows.len());
        Ok(out)
    }
}
