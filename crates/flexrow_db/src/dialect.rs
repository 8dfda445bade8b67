//! SQL dialects understood by the schema synchronizer.
//!
//! Every statement the core issues that is not a plain parameterized CRUD
//! statement is rendered here, so the core never hardcodes backend syntax.

use std::borrow::Cow;
use std::fmt;

use crate::sql::placeholders;

/// Backend SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// MySQL / MariaDB. Column types are emitted verbatim.
    MySql,
    /// SQLite. Used for embedded stores and tests.
    Sqlite,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::MySql => "MySQL",
            Dialect::Sqlite => "SQLite",
        }
    }

    /// Quote a table or column identifier.
    pub fn quote_ident(&self, name: &str) -> String {
        let quote = match self {
            Dialect::MySql => '`',
            Dialect::Sqlite => '"',
        };
        let mut escaped = String::with_capacity(name.len() + 2);
        escaped.push(quote);
        for ch in name.chars() {
            if ch == quote {
                escaped.push(quote);
            }
            escaped.push(ch);
        }
        escaped.push(quote);
        escaped
    }

    /// Statement listing user tables; the table name is the first column.
    pub fn list_tables_sql(&self) -> &'static str {
        match self {
            Dialect::MySql => "SHOW TABLES",
            Dialect::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
            }
        }
    }

    /// Statement describing the columns of `table`.
    pub fn describe_sql(&self, table: &str) -> String {
        match self {
            Dialect::MySql => format!("DESCRIBE {}", self.quote_ident(table)),
            Dialect::Sqlite => format!("PRAGMA table_info({})", self.quote_ident(table)),
        }
    }

    /// Names of the describe-result columns holding `(field name, column type)`.
    pub fn describe_columns(&self) -> (&'static str, &'static str) {
        match self {
            Dialect::MySql => ("Field", "Type"),
            Dialect::Sqlite => ("name", "type"),
        }
    }

    /// Base table shape: an auto-incrementing unsigned `id` primary key and nothing else.
    pub fn create_table_sql(&self, table: &str) -> String {
        match self {
            Dialect::MySql => format!(
                "CREATE TABLE {} (id INT(11) UNSIGNED NOT NULL AUTO_INCREMENT, PRIMARY KEY (id)) ENGINE = InnoDB",
                self.quote_ident(table)
            ),
            Dialect::Sqlite => format!(
                "CREATE TABLE {} (id INTEGER PRIMARY KEY AUTOINCREMENT)",
                self.quote_ident(table)
            ),
        }
    }

    pub fn add_column_sql(&self, table: &str, column: &str, column_type: &str) -> String {
        format!(
            "ALTER TABLE {} ADD {} {}",
            self.quote_ident(table),
            self.quote_ident(column),
            self.render_column_type(column_type)
        )
    }

    /// Adapt a MySQL column-type literal to this dialect.
    ///
    /// SQLite's type grammar ends at the parenthesized width, so
    /// `TINYINT(1) UNSIGNED` is rendered as `TINYINT UNSIGNED(1)`.
    pub fn render_column_type<'a>(&self, column_type: &'a str) -> Cow<'a, str> {
        match self {
            Dialect::MySql => Cow::Borrowed(column_type),
            Dialect::Sqlite => {
                let Some(base) = column_type.strip_suffix(" UNSIGNED") else {
                    return Cow::Borrowed(column_type);
                };
                match base.find('(') {
                    Some(open) => Cow::Owned(format!(
                        "{} UNSIGNED{}",
                        &base[..open],
                        &base[open..]
                    )),
                    None => Cow::Borrowed(column_type),
                }
            }
        }
    }

    /// INSERT for the given columns with positional placeholders.
    pub fn insert_sql(&self, table: &str, columns: &[&str]) -> String {
        let table = self.quote_ident(table);
        if columns.is_empty() {
            return match self {
                Dialect::MySql => format!("INSERT INTO {} () VALUES ()", table),
                Dialect::Sqlite => format!("INSERT INTO {} DEFAULT VALUES", table),
            };
        }
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            cols,
            placeholders(columns.len())
        )
    }

    /// UPDATE of the given columns for one id; the id is the last binding.
    pub fn update_sql(&self, table: &str, columns: &[&str]) -> String {
        let assignments = columns
            .iter()
            .map(|c| format!("{} = ?", self.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET {} WHERE id = ?",
            self.quote_ident(table),
            assignments
        )
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
