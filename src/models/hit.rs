//! Hit records and their field types.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;
use uuid::Uuid;

/// Maximum number of values in a [`ScreenSize`].
pub const MAX_SCREEN_VALUES: usize = 3;

/// Session identity attached to a hit.
///
/// Older hits carry a numeric session ID; newer hits carry a 128-bit value.
/// Both shapes are kept as-is on export: legacy IDs are written as their
/// decimal string, canonical IDs as a hyphenated UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRef {
    /// 128-bit session identity.
    Canonical(Uuid),
    /// Legacy numeric session identity.
    Legacy(i64),
}

impl SessionRef {
    /// Returns the canonical UUID, if this is not a legacy session.
    #[must_use]
    pub const fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Canonical(id) => Some(*id),
            Self::Legacy(_) => None,
        }
    }
}

impl Default for SessionRef {
    fn default() -> Self {
        Self::Canonical(Uuid::nil())
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canonical(id) => write!(f, "{}", id.hyphenated()),
            Self::Legacy(id) => write!(f, "{id}"),
        }
    }
}

/// Error returned when a session token is neither a decimal ID nor a UUID.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("not a session identity: {0:?}")]
pub struct ParseSessionError(String);

impl FromStr for SessionRef {
    type Err = ParseSessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('-').unwrap_or(s);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<i64>()
                .map(Self::Legacy)
                .map_err(|_| ParseSessionError(s.to_string()));
        }

        Uuid::parse_str(s)
            .map(Self::Canonical)
            .map_err(|_| ParseSessionError(s.to_string()))
    }
}

/// Classification of a hit's referrer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefScheme {
    /// Regular HTTP referrer.
    Http,
    /// Non-HTTP referrer (e.g. `android-app://`).
    Other,
    /// Referrer generated from a query parameter.
    Generated,
    /// Campaign parameter.
    Campaign,
}

impl RefScheme {
    /// Returns all schemes, in wire order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Http, Self::Other, Self::Generated, Self::Campaign]
    }

    /// Returns the single-letter wire code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "h",
            Self::Other => "o",
            Self::Generated => "g",
            Self::Campaign => "c",
        }
    }

    /// Parses a wire code. Codes are case-sensitive.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|scheme| scheme.as_str() == s)
    }
}

impl fmt::Display for RefScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a screen size list cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ScreenSizeError {
    /// More than [`MAX_SCREEN_VALUES`] values.
    #[error("too many values: {0} (max: {MAX_SCREEN_VALUES})")]
    TooMany(usize),
    /// A value is not a finite number.
    #[error("not a number: {0:?}")]
    NotANumber(String),
    /// A value is negative.
    #[error("negative value: {0}")]
    Negative(String),
}

/// Screen dimensions as reported by the browser: width, height, pixel ratio.
///
/// Holds between zero and three non-negative numbers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenSize(Vec<f64>);

impl ScreenSize {
    /// Creates a screen size, validating the values.
    ///
    /// # Errors
    ///
    /// Returns an error if there are more than three values or any value is
    /// negative or not finite.
    pub fn new(values: Vec<f64>) -> Result<Self, ScreenSizeError> {
        if values.len() > MAX_SCREEN_VALUES {
            return Err(ScreenSizeError::TooMany(values.len()));
        }
        for v in &values {
            if !v.is_finite() {
                return Err(ScreenSizeError::NotANumber(v.to_string()));
            }
            if v.is_sign_negative() && *v != 0.0 {
                return Err(ScreenSizeError::Negative(v.to_string()));
            }
        }
        Ok(Self(values))
    }

    /// Returns the values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Returns whether no size was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ScreenSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

impl FromStr for ScreenSize {
    type Err = ScreenSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }

        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() > MAX_SCREEN_VALUES {
            return Err(ScreenSizeError::TooMany(parts.len()));
        }

        let values = parts
            .into_iter()
            .map(|p| {
                p.parse::<f64>()
                    .map_err(|_| ScreenSizeError::NotANumber(p.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(values)
    }
}

/// One recorded analytics event: a page view or a custom event.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Site the hit belongs to.
    pub site_id: i64,
    /// Request path, or event name for events. Never empty.
    pub path: String,
    /// Page title.
    pub title: String,
    /// Whether this is a custom event rather than a page view.
    pub event: bool,
    /// Bot classification code; 0 is "not a bot".
    pub bot: i32,
    /// Session the hit belongs to.
    pub session: SessionRef,
    /// Whether this is the first hit of the visitor on this path.
    pub first_visit: bool,
    /// Referrer.
    pub referrer: String,
    /// Referrer classification.
    pub ref_scheme: Option<RefScheme>,
    /// User agent string.
    pub browser: String,
    /// Screen size.
    pub size: ScreenSize,
    /// ISO 3166 location code.
    pub location: String,
    /// When the hit was recorded.
    pub created_at: DateTime<Utc>,
}

impl Hit {
    /// Creates a page view with empty optional fields.
    #[must_use]
    pub fn new(site_id: i64, path: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            site_id,
            path: path.into(),
            title: String::new(),
            event: false,
            bot: 0,
            session: SessionRef::default(),
            first_visit: false,
            referrer: String::new(),
            ref_scheme: None,
            browser: String::new(),
            size: ScreenSize::default(),
            location: String::new(),
            created_at,
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the session.
    #[must_use]
    pub const fn with_session(mut self, session: SessionRef) -> Self {
        self.session = session;
        self
    }

    /// Sets the referrer and its scheme.
    #[must_use]
    pub fn with_referrer(mut self, referrer: impl Into<String>, scheme: Option<RefScheme>) -> Self {
        self.referrer = referrer.into();
        self.ref_scheme = scheme;
        self
    }

    /// Sets the browser.
    #[must_use]
    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = browser.into();
        self
    }

    /// Sets the screen size.
    #[must_use]
    pub fn with_size(mut self, size: ScreenSize) -> Self {
        self.size = size;
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Marks the hit as an event.
    #[must_use]
    pub const fn as_event(mut self) -> Self {
        self.event = true;
        self
    }

    /// Marks the hit as a first visit.
    #[must_use]
    pub const fn as_first_visit(mut self) -> Self {
        self.first_visit = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_parse_legacy() {
        assert_eq!(
            "42".parse::<SessionRef>().unwrap(),
            SessionRef::Legacy(42)
        );
        assert_eq!(
            "-7".parse::<SessionRef>().unwrap(),
            SessionRef::Legacy(-7)
        );
    }

    #[test]
    fn test_session_parse_canonical() {
        let id = Uuid::new_v4();
        let parsed: SessionRef = id.to_string().parse().unwrap();
        assert_eq!(parsed, SessionRef::Canonical(id));
        assert_eq!(parsed.to_string(), id.hyphenated().to_string());
    }

    #[test]
    fn test_session_parse_rejects_garbage() {
        assert!("".parse::<SessionRef>().is_err());
        assert!("abc".parse::<SessionRef>().is_err());
        assert!("99999999999999999999".parse::<SessionRef>().is_err());
    }

    #[test]
    fn test_ref_scheme_parse() {
        for scheme in RefScheme::all() {
            assert_eq!(RefScheme::parse(scheme.as_str()), Some(*scheme));
        }
        assert_eq!(RefScheme::parse("H"), None);
        assert_eq!(RefScheme::parse("x"), None);
    }

    #[test]
    fn test_screen_size_display() {
        let size = ScreenSize::new(vec![1920.0, 1080.0, 1.5]).unwrap();
        assert_eq!(size.to_string(), "1920,1080,1.5");
        assert_eq!(ScreenSize::default().to_string(), "");
    }

    #[test]
    fn test_screen_size_parse() {
        let size: ScreenSize = "1920, 1080,2".parse().unwrap();
        assert_eq!(size.values(), &[1920.0, 1080.0, 2.0]);
        assert!("".parse::<ScreenSize>().unwrap().is_empty());
    }

    #[test]
    fn test_screen_size_rejects_invalid() {
        assert_eq!(
            "1,2,3,4".parse::<ScreenSize>(),
            Err(ScreenSizeError::TooMany(4))
        );
        assert!(matches!(
            "1,x".parse::<ScreenSize>(),
            Err(ScreenSizeError::NotANumber(_))
        ));
        assert!(matches!(
            "-1".parse::<ScreenSize>(),
            Err(ScreenSizeError::Negative(_))
        ));
        assert!(matches!(
            "NaN".parse::<ScreenSize>(),
            Err(ScreenSizeError::NotANumber(_))
        ));
    }
}
