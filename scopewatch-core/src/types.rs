//! Core domain types for scopewatch
//!
//! A navigation observed by the host environment becomes zero or more
//! [`Report`]s. Reports are the only thing that ever leaves the process.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Host identity used when the settings store has never been written.
pub const DEFAULT_HOST_IDENTITY: &str = "com.example.benefit_collector";

// ============================================
// Navigation events
// ============================================

/// A navigation pushed to us by the event source.
///
/// Ephemeral: evaluated once and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEvent {
    /// Absolute URL as committed by the host environment
    pub url: String,
    /// Only top-level navigations are eligible
    #[serde(default = "default_top_level")]
    pub top_level: bool,
}

fn default_top_level() -> bool {
    true
}

impl NavigationEvent {
    /// A top-level navigation to `url`
    pub fn top_level(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            top_level: true,
        }
    }

    /// A navigation inside a sub-frame
    pub fn subframe(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            top_level: false,
        }
    }
}

// ============================================
// Reports
// ============================================

/// What a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// A normalized in-scope domain
    Domain,
    /// The configured custom page
    Page,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Domain => "domain",
            ReportKind::Page => "page",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "domain" => Ok(ReportKind::Domain),
            "page" => Ok(ReportKind::Page),
            other => Err(Error::Store(format!("unknown report kind: {}", other))),
        }
    }
}

/// A normalized, minimal piece of information eligible for delivery.
///
/// Serializes as `{"kind": "domain", "value": "lib.edu", "seen_at": "..."}`,
/// which is both the wire item and the persisted queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub kind: ReportKind,
    pub value: String,
    pub seen_at: DateTime<Utc>,
}

impl Report {
    pub fn domain(value: impl Into<String>, seen_at: DateTime<Utc>) -> Self {
        Self {
            kind: ReportKind::Domain,
            value: value.into(),
            seen_at,
        }
    }

    pub fn page(value: impl Into<String>, seen_at: DateTime<Utc>) -> Self {
        Self {
            kind: ReportKind::Page,
            value: value.into(),
            seen_at,
        }
    }

    /// Deduplication key for this report. Never transmitted.
    pub fn throttle_key(&self) -> ThrottleKey {
        ThrottleKey::new(self.kind, &self.value)
    }
}

/// `"domain:<value>"` or `"page:<value>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThrottleKey(String);

impl ThrottleKey {
    pub fn new(kind: ReportKind, value: &str) -> Self {
        Self(format!("{}:{}", kind.as_str(), value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================
// Settings
// ============================================

/// User-controlled settings, owned by the settings store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Master switch for collection
    pub auto_collect: bool,
    /// Normalized page (scheme + host + path, lowercase) to report exactly
    pub custom_page: Option<String>,
    /// Which collector process receives deliveries
    pub host_identity: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_collect: true,
            custom_page: None,
            host_identity: DEFAULT_HOST_IDENTITY.to_string(),
        }
    }
}

impl Settings {
    /// Normalize and store a custom page. Returns the stored value.
    pub fn set_custom_page(&mut self, raw: &str) -> Result<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidPage("enter a page URL first".to_string()));
        }
        let normalized = crate::policy::normalize_page(trimmed).ok_or_else(|| {
            Error::InvalidPage(format!("{} is not an absolute http(s) URL", trimmed))
        })?;
        self.custom_page = Some(normalized.clone());
        Ok(normalized)
    }

    pub fn clear_custom_page(&mut self) {
        self.custom_page = None;
    }
}
