//! Policy evaluation: which navigations produce reports
//!
//! Two independent rules:
//! - **Scope rule:** hosts ending in `.edu` or `.gov` yield a `domain` report.
//! - **Custom page rule:** an exact match on the configured page yields a
//!   `page` report.
//!
//! Evaluation is pure. Throttling happens afterwards in the caller.

use chrono::{DateTime, Utc};
use url::Url;

use crate::types::{NavigationEvent, Report, Settings};

/// Domain suffixes collected by the scope rule
const SCOPE_SUFFIXES: &[&str] = &[".edu", ".gov"];

/// Lowercase a hostname and strip a single leading `www.`
pub fn normalize_domain(host: &str) -> String {
    let lower = host.to_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

/// Whether a normalized domain falls under the scope rule
pub fn is_in_scope(domain: &str) -> bool {
    SCOPE_SUFFIXES.iter().any(|suffix| domain.ends_with(suffix))
}

/// Normalize an absolute http(s) URL to lowercase `scheme://host[:port]/path`.
///
/// Query and fragment are dropped. Returns `None` for anything that is not a
/// parseable http or https URL.
pub fn normalize_page(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    normalized_page_of(&url)
}

fn normalized_page_of(url: &Url) -> Option<String> {
    match url.scheme() {
        "http" | "https" => {}
        _ => return None,
    }
    let origin = url.origin().ascii_serialization();
    Some(format!("{}{}", origin, url.path()).to_lowercase())
}

/// Produce candidate reports for one navigation.
///
/// Sub-frame navigations, disabled collection, and anything that is not an
/// absolute http(s) URL all yield an empty vector.
pub fn evaluate(event: &NavigationEvent, settings: &Settings, now: DateTime<Utc>) -> Vec<Report> {
    if !event.top_level || !settings.auto_collect {
        return Vec::new();
    }

    let Ok(url) = Url::parse(&event.url) else {
        return Vec::new();
    };
    let Some(page) = normalized_page_of(&url) else {
        return Vec::new();
    };

    let mut reports = Vec::with_capacity(2);

    if let Some(host) = url.host_str() {
        let domain = normalize_domain(host);
        if is_in_scope(&domain) {
            reports.push(Report::domain(domain, now));
        }
    }

    if let Some(custom) = settings.custom_page.as_deref() {
        if page == custom {
            reports.push(Report::page(custom, now));
        }
    }

    reports
}
