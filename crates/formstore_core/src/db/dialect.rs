//! Vendor-agnostic rendering of query templates.
//!
//! # Responsibility
//! - Substitute the four positional tokens of a query template with the
//!   identifier quotes and parameter marker syntax of one SQL dialect.
//!
//! # Invariants
//! - Only `{0}`, `{1}`, `{2}` and `{3}` are substituted; all other text,
//!   including other braces, is copied unchanged.

/// Identifier quoting and parameter marker convention of one SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlDialect {
    identifier_open: &'static str,
    identifier_close: &'static str,
    parameter_prefix: &'static str,
    parameter_suffix: &'static str,
}

impl SqlDialect {
    /// ANSI double-quoted identifiers with `:name` parameters.
    pub const SQLITE: Self = Self::new("\"", "\"", ":", "");

    /// Bracketed identifiers with `@name` parameters.
    ///
    /// SQLite accepts this syntax too.
    pub const SQL_SERVER: Self = Self::new("[", "]", "@", "");

    pub const fn new(
        identifier_open: &'static str,
        identifier_close: &'static str,
        parameter_prefix: &'static str,
        parameter_suffix: &'static str,
    ) -> Self {
        Self {
            identifier_open,
            identifier_close,
            parameter_prefix,
            parameter_suffix,
        }
    }

    /// Returns `name` wrapped in this dialect's identifier quotes.
    pub fn identifier(&self, name: &str) -> String {
        format!("{}{name}{}", self.identifier_open, self.identifier_close)
    }

    /// Returns the marker that binds parameter `name` in this dialect.
    pub fn parameter(&self, name: &str) -> String {
        format!("{}{name}{}", self.parameter_prefix, self.parameter_suffix)
    }

    /// Renders a query template into dialect-specific SQL.
    pub fn render(&self, template: &str) -> String {
        let mut rendered = String::with_capacity(template.len() + 32);
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let tail = &rest[start..];
            let token = match tail.as_bytes().get(1..3) {
                Some(&[slot, b'}']) => self.token(slot),
                _ => None,
            };

            match token {
                Some(text) => {
                    rendered.push_str(text);
                    rest = &tail[3..];
                }
                None => {
                    rendered.push('{');
                    rest = &tail[1..];
                }
            }
        }

        rendered.push_str(rest);
        rendered
    }

    fn token(&self, slot: u8) -> Option<&'static str> {
        match slot {
            b'0' => Some(self.identifier_open),
            b'1' => Some(self.identifier_close),
            b'2' => Some(self.parameter_prefix),
            b'3' => Some(self.parameter_suffix),
            _ => None,
        }
    }
}

impl Default for SqlDialect {
    fn default() -> Self {
        Self::SQLITE
    }
}

#[cfg(test)]
mod tests {
    use super::SqlDialect;

    const TEMPLATE: &str = "SELECT {0}ID{1} FROM {0}FormEntry{1} WHERE {0}ID{1}={2}formEntryId{3}";

    #[test]
    fn renders_sqlite_tokens() {
        assert_eq!(
            SqlDialect::SQLITE.render(TEMPLATE),
            r#"SELECT "ID" FROM "FormEntry" WHERE "ID"=:formEntryId"#
        );
    }

    #[test]
    fn renders_sql_server_tokens() {
        assert_eq!(
            SqlDialect::SQL_SERVER.render(TEMPLATE),
            "SELECT [ID] FROM [FormEntry] WHERE [ID]=@formEntryId"
        );
    }

    #[test]
    fn leaves_unknown_braces_untouched() {
        let dialect = SqlDialect::new("`", "`", "$", "!");
        assert_eq!(
            dialect.render("{0}a{1} {4} {x} {2}p{3} {"),
            "`a` {4} {x} $p! {"
        );
    }

    #[test]
    fn parameter_and_identifier_helpers_match_render() {
        let dialect = SqlDialect::SQL_SERVER;
        assert_eq!(dialect.identifier("Created"), dialect.render("{0}Created{1}"));
        assert_eq!(dialect.parameter("start"), dialect.render("{2}start{3}"));
    }
}
