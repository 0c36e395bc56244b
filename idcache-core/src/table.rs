//! Table identifiers.

use std::fmt;
use std::str::FromStr;

use crate::ValidationError;

/// Separator between the namespace and name parts of a table identifier.
pub const TABLE_SEPARATOR: char = '.';

/// A validated `namespace.name` table identifier.
///
/// The name part is everything after the first separator and may itself
/// contain separators (`"analytics.daily.events"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName(String);

impl TableName {
    /// Parse and validate a table identifier.
    pub fn parse(table: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidTableName {
            table: table.to_string(),
            reason: reason.to_string(),
        };
        let (namespace, name) = table
            .split_once(TABLE_SEPARATOR)
            .ok_or_else(|| invalid("must be in format 'schema_name.table_name'"))?;
        if namespace.is_empty() {
            return Err(invalid("schema part must not be empty"));
        }
        if name.is_empty() {
            return Err(invalid("table part must not be empty"));
        }
        Ok(Self(table.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part before the first separator.
    pub fn namespace(&self) -> &str {
        self.0
            .split_once(TABLE_SEPARATOR)
            .map_or(self.0.as_str(), |(ns, _)| ns)
    }

    /// Part after the first separator.
    pub fn name(&self) -> &str {
        self.0.split_once(TABLE_SEPARATOR).map_or("", |(_, n)| n)
    }

    /// File-system safe stem: every separator replaced with `_`.
    pub fn file_stem(&self) -> String {
        self.0.replace(TABLE_SEPARATOR, "_")
    }
}

impl FromStr for TableName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let t = TableName::parse("public.users").unwrap();
        assert_eq!(t.namespace(), "public");
        assert_eq!(t.name(), "users");
        assert_eq!(t.file_stem(), "public_users");
    }

    #[test]
    fn test_file_stem_replaces_every_separator() {
        let t = TableName::parse("analytics.daily.events").unwrap();
        assert_eq!(t.name(), "daily.events");
        assert_eq!(t.file_stem(), "analytics_daily_events");
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        let err = TableName::parse("users").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTableName { .. }));
        assert!(TableName::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_parts() {
        assert!(TableName::parse(".users").is_err());
        assert!(TableName::parse("public.").is_err());
    }

    #[test]
    fn test_from_str() {
        let t: TableName = "s.t".parse().unwrap();
        assert_eq!(t.to_string(), "s.t");
    }
}
