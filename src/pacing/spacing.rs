//! Minimum spacing between iteration starts.
//!
//! The start time of the latest iteration is kept in a small marker file so a
//! restarted process keeps the spacing too.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct IterationSpacing {
    min_interval_secs: f64,
    marker: Option<PathBuf>,
    last_start: Option<f64>,
}

impl IterationSpacing {
    /// Spacing that never waits and remembers nothing.
    pub fn disabled() -> Self {
        Self {
            min_interval_secs: 0.0,
            marker: None,
            last_start: None,
        }
    }

    /// Spacing in memory only.
    pub fn new(min_interval_secs: f64) -> Self {
        Self {
            min_interval_secs: min_interval_secs.max(0.0),
            ..Self::disabled()
        }
    }

    /// Spacing backed by a marker file. An unreadable marker is ignored.
    pub fn with_marker(min_interval_secs: f64, marker: impl Into<PathBuf>) -> Self {
        let marker = marker.into();
        let last_start = fs::read_to_string(&marker)
            .ok()
            .and_then(|text| text.trim().parse::<f64>().ok())
            .filter(|ts| ts.is_finite());
        if let Some(ts) = last_start {
            debug!(marker = %marker.display(), last_start = ts, "loaded iteration marker");
        }

        Self {
            min_interval_secs: min_interval_secs.max(0.0),
            marker: Some(marker),
            last_start,
        }
    }

    pub fn last_start(&self) -> Option<f64> {
        self.last_start
    }

    /// Seconds until the next iteration may start.
    pub fn wait_time(&self, now: f64) -> f64 {
        match self.last_start {
            Some(last) if self.min_interval_secs > 0.0 => {
                (self.min_interval_secs - (now - last)).max(0.0)
            }
            _ => 0.0,
        }
    }

    /// Remember that an iteration started at `now`.
    pub fn mark_start(&mut self, now: f64) {
        self.last_start = Some(now);
        let Some(marker) = &self.marker else {
            return;
        };
        if let Err(err) = fs::write(marker, now.to_string()) {
            warn!(marker = %marker.display(), error = %err, "could not write iteration marker");
        }
    }
}
