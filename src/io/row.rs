//! Row codec for export artifacts.
//!
//! A row is a fixed, positional list of [`COLUMN_COUNT`] text fields. The
//! header row carries the column names, with the schema version prefixed to
//! the first one (`1Path`). Columns are never looked up by header name.

use crate::io::validation::{RowError, RowValidator};
use crate::models::{Hit, ScreenSize};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Schema version written to and required from artifact headers.
pub const EXPORT_VERSION: &str = "1";

/// Number of columns in every row.
pub const COLUMN_COUNT: usize = 12;

/// One column of the row format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Header label.
    pub header: &'static str,
    /// Field name used in validation messages.
    pub field: &'static str,
}

const fn column(header: &'static str, field: &'static str) -> Column {
    Column { header, field }
}

/// Columns in wire order.
pub const COLUMNS: [Column; COLUMN_COUNT] = [
    column("Path", "path"),
    column("Title", "title"),
    column("Event", "event"),
    column("Bot", "bot"),
    column("Session", "session"),
    column("FirstVisit", "firstVisit"),
    column("Referrer", "ref"),
    column("Referrer scheme", "refScheme"),
    column("Browser", "browser"),
    column("Screen size", "size"),
    column("Location", "location"),
    column("Date", "createdAt"),
];

const PATH: usize = 0;
const TITLE: usize = 1;
const EVENT: usize = 2;
const BOT: usize = 3;
const SESSION: usize = 4;
const FIRST_VISIT: usize = 5;
const REFERRER: usize = 6;
const REF_SCHEME: usize = 7;
const BROWSER: usize = 8;
const SIZE: usize = 9;
const LOCATION: usize = 10;
const CREATED_AT: usize = 11;

/// Returns the header row.
#[must_use]
pub fn header() -> [String; COLUMN_COUNT] {
    std::array::from_fn(|i| {
        let name = COLUMNS[i].header;
        if i == 0 {
            format!("{EXPORT_VERSION}{name}")
        } else {
            name.to_string()
        }
    })
}

/// Checks the schema version of a header record.
///
/// Only the version prefix of the first cell is compared; the remaining
/// header cells are informational.
///
/// # Errors
///
/// Returns [`Error::UnsupportedVersion`] if the first cell does not start
/// with [`EXPORT_VERSION`].
pub fn check_header(record: &csv::StringRecord) -> Result<()> {
    let first = record.get(0).unwrap_or_default();
    if first.starts_with(EXPORT_VERSION) {
        return Ok(());
    }
    Err(Error::UnsupportedVersion {
        found: first.chars().next().map(String::from).unwrap_or_default(),
        expected: EXPORT_VERSION,
    })
}

/// Formats a timestamp in the wire format (UTC, whole seconds).
#[must_use]
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

const fn bool_str(b: bool) -> &'static str {
    if b { "true" } else { "false" }
}

/// One encoded hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow([String; COLUMN_COUNT]);

impl ExportRow {
    /// Encodes a hit.
    ///
    /// Sessions are written in their stored shape: canonical sessions as a
    /// hyphenated UUID, legacy sessions as their decimal ID.
    #[must_use]
    pub fn from_hit(hit: &Hit) -> Self {
        Self([
            hit.path.clone(),
            hit.title.clone(),
            bool_str(hit.event).to_string(),
            hit.bot.to_string(),
            hit.session.to_string(),
            bool_str(hit.first_visit).to_string(),
            hit.referrer.clone(),
            hit.ref_scheme.map(|s| s.as_str().to_string()).unwrap_or_default(),
            hit.browser.clone(),
            hit.size.to_string(),
            hit.location.clone(),
            format_timestamp(&hit.created_at),
        ])
    }

    /// Takes the fields of a CSV record.
    ///
    /// # Errors
    ///
    /// Returns [`RowError::Arity`] if the record does not have exactly
    /// [`COLUMN_COUNT`] fields.
    pub fn from_record(record: &csv::StringRecord) -> std::result::Result<Self, RowError> {
        if record.len() != COLUMN_COUNT {
            return Err(RowError::Arity {
                got: record.len(),
                want: COLUMN_COUNT,
            });
        }
        Ok(Self(std::array::from_fn(|i| {
            record.get(i).unwrap_or_default().to_string()
        })))
    }

    /// Returns the fields in wire order.
    #[must_use]
    pub const fn fields(&self) -> &[String; COLUMN_COUNT] {
        &self.0
    }

    /// Returns the raw session token.
    #[must_use]
    pub fn session_token(&self) -> &str {
        &self.0[SESSION]
    }

    /// Decodes and validates the row into a hit for `site_id`.
    ///
    /// A malformed screen size rejects the row on its own; otherwise every
    /// field is checked and all issues are reported together.
    ///
    /// # Errors
    ///
    /// Returns [`RowError::ScreenSize`] or [`RowError::Invalid`].
    pub fn to_hit(&self, site_id: i64) -> std::result::Result<Hit, RowError> {
        let f = &self.0;
        let size: ScreenSize = f[SIZE].parse()?;

        let mut v = RowValidator::new();
        v.required(COLUMNS[PATH].field, &f[PATH]);
        let event = v.boolean(COLUMNS[EVENT].field, &f[EVENT]);
        let bot = v.integer(COLUMNS[BOT].field, &f[BOT]);
        let session = v.session(COLUMNS[SESSION].field, &f[SESSION]);
        let first_visit = v.boolean(COLUMNS[FIRST_VISIT].field, &f[FIRST_VISIT]);
        let ref_scheme = v.ref_scheme(COLUMNS[REF_SCHEME].field, &f[REF_SCHEME]);
        let created_at = v.timestamp(COLUMNS[CREATED_AT].field, &f[CREATED_AT]);
        v.finish()?;

        Ok(Hit {
            site_id,
            path: f[PATH].clone(),
            title: f[TITLE].clone(),
            event,
            bot,
            session,
            first_visit,
            referrer: f[REFERRER].clone(),
            ref_scheme,
            browser: f[BROWSER].clone(),
            size,
            location: f[LOCATION].clone(),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RefScheme, SessionRef};
    use chrono::TimeZone;
    use test_case::test_case;
    use uuid::Uuid;

    fn sample() -> Hit {
        let created = Utc.with_ymd_and_hms(2021, 5, 4, 3, 2, 1).unwrap();
        Hit::new(1, "/blog/post", created)
            .with_title("A post, with a comma")
            .with_session(SessionRef::Canonical(Uuid::new_v4()))
            .with_referrer("https://example.com/", Some(RefScheme::Http))
            .with_browser("Mozilla/5.0")
            .with_size(ScreenSize::new(vec![1920.0, 1080.0, 2.0]).unwrap())
            .with_location("NL")
            .as_first_visit()
    }

    fn record(fields: &[String]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    fn row_with(index: usize, value: &str) -> ExportRow {
        let mut fields = ExportRow::from_hit(&sample()).fields().clone();
        fields[index] = value.to_string();
        ExportRow(fields)
    }

    #[test]
    fn test_header() {
        let h = header();
        assert_eq!(h[0], "1Path");
        assert_eq!(h[11], "Date");
        assert!(check_header(&record(&h)).is_ok());
    }

    #[test]
    fn test_check_header_rejects_other_version() {
        let mut h = header();
        h[0] = "2Path".to_string();
        let err = check_header(&record(&h)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { ref found, .. } if found == "2"));
    }

    #[test]
    fn test_encode() {
        let hit = sample();
        let row = ExportRow::from_hit(&hit);
        let f = row.fields();
        assert_eq!(f[EVENT], "false");
        assert_eq!(f[FIRST_VISIT], "true");
        assert_eq!(f[REF_SCHEME], "h");
        assert_eq!(f[SIZE], "1920,1080,2");
        assert_eq!(f[CREATED_AT], "2021-05-04T03:02:01Z");
        assert_eq!(row.session_token(), hit.session.to_string());
    }

    #[test]
    fn test_encode_legacy_session_verbatim() {
        let hit = sample().with_session(SessionRef::Legacy(123_456));
        assert_eq!(ExportRow::from_hit(&hit).session_token(), "123456");
    }

    #[test]
    fn test_decode_roundtrip() {
        let hit = sample();
        let decoded = ExportRow::from_hit(&hit).to_hit(1).unwrap();
        assert_eq!(decoded, hit);
    }

    #[test]
    fn test_decode_arity() {
        let short = record(&["/a".to_string(), "t".to_string()]);
        assert_eq!(
            ExportRow::from_record(&short),
            Err(RowError::Arity { got: 2, want: 12 })
        );
    }

    #[test]
    fn test_decode_empty_path_required() {
        let err = row_with(PATH, "").to_hit(1).unwrap_err();
        assert!(err.to_string().contains("required"), "{err}");
    }

    #[test]
    fn test_screen_size_short_circuits() {
        let mut fields = row_with(SIZE, "1,2,3,4").fields().clone();
        fields[PATH] = String::new();
        fields[EVENT] = "nope".to_string();
        let err = ExportRow(fields).to_hit(1).unwrap_err();
        assert!(matches!(err, RowError::ScreenSize(_)));
    }

    #[test_case(EVENT, "1" ; "numeric boolean")]
    #[test_case(FIRST_VISIT, "yes" ; "word boolean")]
    #[test_case(BOT, "1.5" ; "fractional bot")]
    #[test_case(REF_SCHEME, "x" ; "unknown scheme")]
    #[test_case(CREATED_AT, "2021-05-04 03:02:01" ; "timestamp without offset")]
    #[test_case(SESSION, "not-a-session" ; "garbage session")]
    fn test_decode_rejects(index: usize, value: &str) {
        let err = row_with(index, value).to_hit(1).unwrap_err();
        let RowError::Invalid(issues) = err else {
            unreachable!("expected validation issues");
        };
        assert!(issues.has_field(COLUMNS[index].field));
    }

    #[test_case("" ; "empty")]
    #[test_case("42" ; "legacy")]
    #[test_case("6f1c0e7e-2c57-4bd4-9a0c-3f3c4d8f0a11" ; "canonical")]
    fn test_decode_accepts_session(token: &str) {
        assert!(row_with(SESSION, token).to_hit(1).is_ok());
    }
}
