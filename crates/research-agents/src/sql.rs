//! Extraction of SQL statements from generated text

use regex::Regex;
use std::sync::LazyLock;

static STATEMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)\bselect\b.*?;").ok());

static SELECT_LIST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)\bselect\s+(.*?)\s+from\b").ok());

static ALIAS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?is)^(.*?)\s+(as\s+)?("[^"]+"|[A-Za-z_][A-Za-z0-9_$]*)$"#).ok()
});

/// Words that end an expression and so cannot be an implicit alias
const TRAILING_KEYWORDS: &[&str] = &["end", "null", "true", "false", "asc", "desc"];

/// First `SELECT ... ;` span in `text`, semicolon included
///
/// Code fences, prose before the statement and any explanation after it are
/// ignored.
pub fn extract_statement(text: &str) -> Option<&str> {
    STATEMENT.as_ref()?.find(text).map(|m| m.as_str())
}

/// Output column names of a statement's select list
///
/// The list is split on commas outside parentheses. An explicit alias
/// (`expr AS name` or `expr name`) becomes the column name; quoted aliases
/// are unquoted. Returns `None` when no select list is found.
pub fn select_columns(statement: &str) -> Option<Vec<String>> {
    let list = SELECT_LIST.as_ref()?.captures(statement)?.get(1)?.as_str();
    let list = strip_distinct(list);

    let columns: Vec<String> = split_top_level(list)
        .into_iter()
        .map(|item| column_label(item.trim()))
        .filter(|c| !c.is_empty())
        .collect();

    (!columns.is_empty()).then_some(columns)
}

fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_i32;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts
}

fn column_label(item: &str) -> String {
    // A bare identifier or qualified name keeps its last segment
    let simple = !item.contains(|c: char| c.is_whitespace() || c == '(');
    if simple {
        return item
            .rsplit('.')
            .next()
            .unwrap_or(item)
            .trim_matches('"')
            .to_string();
    }
    let Some(caps) = ALIAS.as_ref().and_then(|re| re.captures(item)) else {
        return item.to_string();
    };
    let expr = caps[1].trim_end();
    let alias = &caps[3];
    let explicit = caps.get(2).is_some();
    let keyword = TRAILING_KEYWORDS.iter().any(|k| alias.eq_ignore_ascii_case(k));
    if expr.is_empty() || expr.ends_with(['+', '-', '*', '/']) || (keyword && !explicit) {
        return item.to_string();
    }
    alias.trim_matches('"').to_string()
}

fn strip_distinct(list: &str) -> &str {
    const DISTINCT: &str = "distinct ";
    match list.get(..DISTINCT.len()) {
        Some(head) if head.eq_ignore_ascii_case(DISTINCT) => list[DISTINCT.len()..].trim_start(),
        _ => list,
    }
}
