//! Shared row-decoding helpers for the sqlite repositories.

use chrono::{DateTime, Utc};

use crate::domain::error::StoreError;

/// Parse an RFC3339 timestamp stored as TEXT.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Parse(format!("bad timestamp '{s}': {e}")))
}

/// Parse an optional RFC3339 timestamp column.
pub fn parse_datetime_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.map(parse_datetime).transpose()
}

/// Decode a JSON-encoded string list column; NULL means empty.
pub fn parse_string_list(s: Option<&str>) -> Vec<String> {
    s.and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_roundtrip() {
        let now = Utc::now();
        let parsed = parse_datetime(&now.to_rfc3339()).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn test_parse_string_list() {
        assert_eq!(parse_string_list(None), Vec::<String>::new());
        assert_eq!(
            parse_string_list(Some(r#"["src/a.rs","src/b.rs"]"#)),
            vec!["src/a.rs".to_string(), "src/b.rs".to_string()]
        );
        assert_eq!(parse_string_list(Some("not json")), Vec::<String>::new());
    }
}
