//! Small SQL text helpers shared by the collaborators.

/// Statement keywords whose execution yields a row set.
const ROW_RETURNING: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "DESC", "PRAGMA", "WITH", "EXPLAIN"];

/// First keyword of a statement, used as a low-cardinality span field.
pub fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}

/// True if the statement produces rows rather than a command result.
pub fn returns_rows(sql: &str) -> bool {
    let op = sql_op_name(sql);
    ROW_RETURNING.iter().any(|kw| op.eq_ignore_ascii_case(kw))
}

/// `?, ?, ?` with `count` placeholders.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub fn hash_sql(sql: &str) -> String {
    // FNV-1a 64-bit hash for low-cardinality, stable identification.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}
