//! Type inference: runtime value -> type code -> column definition.
//!
//! [`classify`] is an ordered rule chain. Rules overlap (`"1"` is a boolean,
//! an integer and a short text at once), so the first matching rule wins and
//! the order below is part of the contract.

use std::fmt;
use std::sync::LazyLock;

use flexrow_db::Value;
use regex::Regex;

/// Largest integer stored in an unsigned 32-bit column.
const UINT32_MAX: f64 = 4_294_967_295.0;

/// Character limits of the text tiers.
const TEXT_SHORT_LIMIT: usize = 191;
const TEXT_MEDIUM_LIMIT: usize = 255;
const TEXT_LONG_LIMIT: usize = 65_535;

/// Largest integer part a `DECIMAL(10,2)` column holds.
const MONEY_INTEGER_LIMIT: f64 = 99_999_999.0;

struct SpecialPatterns {
    /// Two-decimal amount: -12.34
    money: Regex,
    /// ISO date: YYYY-MM-DD
    date: Regex,
    /// ISO datetime: YYYY-MM-DD HH:MM:SS
    datetime: Regex,
    point: Regex,
    linestring: Regex,
    polygon: Regex,
}

static PATTERNS: LazyLock<SpecialPatterns> = LazyLock::new(|| SpecialPatterns {
    money: Regex::new(r"^-?[0-9]+\.[0-9]{2}$").unwrap(),
    date: Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").unwrap(),
    datetime: Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}\s[0-9]{2}:[0-9]{2}:[0-9]{2}$").unwrap(),
    point: Regex::new(r"^POINT\(").unwrap(),
    linestring: Regex::new(r"^LINESTRING\(").unwrap(),
    polygon: Regex::new(r"^POLYGON\(").unwrap(),
});

/// Integer display widths, which backends report inconsistently.
static INT_WIDTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"int\([0-9]+\)").unwrap());
static UNSIGNED_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"unsigned\([0-9]+\)").unwrap());

/// Normalized column type of every code, for reverse lookup.
static KNOWN_COLUMN_TYPES: LazyLock<Vec<(String, TypeCode)>> = LazyLock::new(|| {
    TypeCode::ALL
        .iter()
        .map(|code| (normalize_column_type(code.column_type()), *code))
        .collect()
});

/// Abstract column class of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeCode {
    Bool = 0,
    Uint32 = 2,
    Double = 3,
    /// Up to 191 characters
    TextShort = 4,
    /// Up to 255 characters
    TextMedium = 5,
    /// Up to 65535 characters
    TextLong = 6,
    TextHuge = 7,
    Date = 80,
    DateTime = 81,
    Time = 83,
    Point = 90,
    LineString = 91,
    Polygon = 92,
    Money = 93,
    Json = 94,
}

impl TypeCode {
    pub const ALL: [TypeCode; 15] = [
        TypeCode::Bool,
        TypeCode::Uint32,
        TypeCode::Double,
        TypeCode::TextShort,
        TypeCode::TextMedium,
        TypeCode::TextLong,
        TypeCode::TextHuge,
        TypeCode::Date,
        TypeCode::DateTime,
        TypeCode::Time,
        TypeCode::Point,
        TypeCode::LineString,
        TypeCode::Polygon,
        TypeCode::Money,
        TypeCode::Json,
    ];

    /// Stable numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Column definition for this code. These literals are shared with
    /// existing stores and must not change.
    pub fn column_type(self) -> &'static str {
        match self {
            TypeCode::Bool => "TINYINT(1) UNSIGNED",
            TypeCode::Uint32 => "INT(11) UNSIGNED",
            TypeCode::Double => "DOUBLE",
            TypeCode::TextShort => "VARCHAR(191)",
            TypeCode::TextMedium => "VARCHAR(255)",
            TypeCode::TextLong => "TEXT",
            TypeCode::TextHuge => "LONGTEXT",
            TypeCode::Date => "DATE",
            TypeCode::DateTime => "DATETIME",
            TypeCode::Time => "TIME",
            TypeCode::Point => "POINT",
            TypeCode::LineString => "LINESTRING",
            TypeCode::Polygon => "POLYGON",
            TypeCode::Money => "DECIMAL(10,2)",
            TypeCode::Json => "JSON",
        }
    }

    /// Map a backend-reported column type back to its code.
    ///
    /// Case, whitespace and integer display widths are ignored, so MySQL's
    /// `int unsigned` and SQLite's `INT UNSIGNED(11)` both resolve to
    /// [`TypeCode::Uint32`]. Returns `None` for types this crate never emits.
    pub fn from_column_type(column_type: &str) -> Option<Self> {
        let normalized = normalize_column_type(column_type);
        KNOWN_COLUMN_TYPES
            .iter()
            .find(|(known, _)| *known == normalized)
            .map(|(_, code)| *code)
    }

    pub fn is_text(self) -> bool {
        self.text_rank().is_some()
    }

    fn text_rank(self) -> Option<u8> {
        match self {
            TypeCode::TextShort => Some(0),
            TypeCode::TextMedium => Some(1),
            TypeCode::TextLong => Some(2),
            TypeCode::TextHuge => Some(3),
            _ => None,
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_type())
    }
}

fn normalize_column_type(raw: &str) -> String {
    let collapsed = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    let without_int_width = INT_WIDTH.replace_all(&collapsed, "int");
    UNSIGNED_WIDTH
        .replace_all(&without_int_width, "unsigned")
        .into_owned()
}

/// Classify a value.
///
/// With `special` set, text is first tested against the money, date,
/// datetime, WKT geometry and JSON shapes.
pub fn classify(value: &Value, special: bool) -> TypeCode {
    match value {
        Value::Null => TypeCode::Bool,
        Value::Float(v) if *v == f64::INFINITY => TypeCode::TextShort,
        Value::Bool(_) => TypeCode::Bool,
        Value::Int(0 | 1) => TypeCode::Bool,
        Value::Int(v) => {
            if (0..=UINT32_MAX as i64).contains(v) {
                TypeCode::Uint32
            } else {
                TypeCode::Double
            }
        }
        Value::Float(_) => TypeCode::Double,
        Value::Text(text) => classify_text(text, special),
        Value::Bytes(bytes) => text_tier(bytes.len()),
        Value::Json(_) => classify(&value.clone().canonicalize(), special),
    }
}

fn classify_text(text: &str, special: bool) -> TypeCode {
    if special {
        if let Some(code) = special_pattern(text) {
            return code;
        }
    }

    if text == "0" || text == "1" {
        return TypeCode::Bool;
    }

    if !starts_with_zeros(text) {
        if let Some(number) = parse_numeric(text) {
            if number.fract() == 0.0 && (0.0..=UINT32_MAX).contains(&number) {
                return TypeCode::Uint32;
            }
            return TypeCode::Double;
        }
    }

    text_tier(text.chars().count())
}

fn special_pattern(text: &str) -> Option<TypeCode> {
    let patterns = &*PATTERNS;
    if patterns.money.is_match(text) {
        Some(TypeCode::Money)
    } else if patterns.date.is_match(text) {
        Some(TypeCode::Date)
    } else if patterns.datetime.is_match(text) {
        Some(TypeCode::DateTime)
    } else if patterns.point.is_match(text) {
        Some(TypeCode::Point)
    } else if patterns.linestring.is_match(text) {
        Some(TypeCode::LineString)
    } else if patterns.polygon.is_match(text) {
        Some(TypeCode::Polygon)
    } else if is_json_document(text) {
        Some(TypeCode::Json)
    } else {
        None
    }
}

/// JSON text that decodes to an object or array.
fn is_json_document(text: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(text),
        Ok(serde_json::Value::Object(_) | serde_json::Value::Array(_))
    )
}

/// Zero-padded numbers (`"007"`) are identifiers, not integers. `"0.5"` is fine.
fn starts_with_zeros(text: &str) -> bool {
    text.len() > 1 && text.starts_with('0') && !text.starts_with("0.")
}

/// Decimal or scientific number text, surrounding whitespace allowed.
fn parse_numeric(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || !trimmed.bytes().any(|b| b.is_ascii_digit())
        || !trimmed
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn text_tier(len: usize) -> TypeCode {
    if len <= TEXT_SHORT_LIMIT {
        TypeCode::TextShort
    } else if len <= TEXT_MEDIUM_LIMIT {
        TypeCode::TextMedium
    } else if len <= TEXT_LONG_LIMIT {
        TypeCode::TextLong
    } else {
        TypeCode::TextHuge
    }
}

/// Column definition a new column needs for `value`.
pub fn column_type_for(value: &Value) -> &'static str {
    classify(value, true).column_type()
}

/// Whether `value` can be written to an existing column of class `column`
/// without widening it.
pub fn fits_column(value: &Value, column: TypeCode) -> bool {
    if value.is_null() {
        return true;
    }
    let required = classify(value, true);
    if required == column {
        return true;
    }
    if let Some(rank) = column.text_rank() {
        let len = match value {
            Value::Bytes(bytes) => bytes.len(),
            other => other.clone().canonicalize().to_text().chars().count(),
        };
        return text_tier(len).text_rank().is_some_and(|needed| needed <= rank);
    }
    match column {
        TypeCode::Uint32 => required == TypeCode::Bool,
        TypeCode::Double => matches!(
            required,
            TypeCode::Bool | TypeCode::Uint32 | TypeCode::Money
        ),
        TypeCode::Money => match required {
            TypeCode::Bool => true,
            TypeCode::Uint32 | TypeCode::Double => {
                numeric_value(value).is_some_and(|v| v.abs().trunc() <= MONEY_INTEGER_LIMIT)
            }
            _ => false,
        },
        TypeCode::DateTime => required == TypeCode::Date,
        _ => false,
    }
}

/// Finite number held by an integer, float, numeric text or JSON number.
pub(crate) fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v).filter(|v| v.is_finite()),
        Value::Text(text) => parse_numeric(text),
        Value::Json(serde_json::Value::Number(n)) => n.as_f64(),
        _ => None,
    }
}
