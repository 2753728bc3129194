//! Delete predicates.
//!
//! Only what record deletion needs: recognizing a query that selects every
//! record, and evaluating simple `field=value` conjunctions against stored
//! JSON. Match-all recognition is purely syntactic.

use serde::Serialize;
use serde_json::Value;

use crate::error::{InventoryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `=`, case-insensitive
    Matches,
    /// `==`, case-sensitive
    Exact,
    /// `<>`
    NotEqual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub field: String,
    pub relation: Relation,
    pub value: String,
}

/// A parsed delete predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CqlQuery {
    MatchAll,
    /// Every term must hold.
    All(Vec<Term>),
}

const SORT_BY: &str = "sortby";

/// Cut the query at a standalone `sortBy` keyword outside quotes.
fn strip_sort_by(query: &str) -> &str {
    let lowered = query.to_ascii_lowercase();
    let mut in_quotes = false;
    let mut at_boundary = true;
    for (idx, ch) in query.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if !in_quotes && at_boundary && lowered[idx..].starts_with(SORT_BY) {
            let rest = &lowered[idx + SORT_BY.len()..];
            if rest.chars().next().map_or(true, char::is_whitespace) {
                return query[..idx].trim_end();
            }
        }
        at_boundary = ch.is_whitespace() || ch == ')';
    }
    query
}

fn strip_parens(mut query: &str) -> &str {
    loop {
        let trimmed = query.trim();
        match trimmed
            .strip_prefix('(')
            .and_then(|inner| inner.strip_suffix(')'))
        {
            Some(inner) if balanced(inner) => query = inner,
            _ => return trimmed,
        }
    }
}

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for ch in s.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Split on top-level ` and ` outside quotes and parentheses.
fn split_conjunction(query: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut depth = 0i32;

    for word in query.split_whitespace() {
        let lowered = word.to_ascii_lowercase();
        if !in_quotes && depth == 0 && lowered == "and" {
            parts.push(std::mem::take(&mut current));
            continue;
        }
        if !in_quotes && depth == 0 && (lowered == "or" || lowered == "not" || lowered == "prox") {
            return Err(unsupported(query));
        }
        for ch in word.chars() {
            match ch {
                '"' => in_quotes = !in_quotes,
                '(' if !in_quotes => depth += 1,
                ')' if !in_quotes => depth -= 1,
                _ => {}
            }
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    parts.push(current);
    Ok(parts)
}

fn unsupported(query: &str) -> InventoryError {
    InventoryError::validation("query", format!("Unsupported CQL query: {}", query))
}

fn parse_term(raw: &str, query: &str) -> Result<Term> {
    let raw = strip_parens(raw);
    let (field, relation, value) = if let Some((f, v)) = raw.split_once("==") {
        (f, Relation::Exact, v)
    } else if let Some((f, v)) = raw.split_once("<>") {
        (f, Relation::NotEqual, v)
    } else if let Some((f, v)) = raw.split_once('=') {
        (f, Relation::Matches, v)
    } else {
        return Err(unsupported(query));
    };

    let field = field.trim();
    if field.is_empty() || field.contains(char::is_whitespace) {
        return Err(unsupported(query));
    }
    Ok(Term {
        field: field.to_string(),
        relation,
        value: unquote(value).to_string(),
    })
}

impl CqlQuery {
    /// Syntactic check for `cql.allRecords=1` or `id=*`, optionally
    /// parenthesized and followed by `sortBy`.
    pub fn is_matching_all(query: &str) -> bool {
        let core: String = strip_parens(strip_sort_by(query.trim()))
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        core.eq_ignore_ascii_case("cql.allRecords=1") || core == "id=*"
    }

    pub fn parse(query: &str) -> Result<CqlQuery> {
        if query.trim().is_empty() {
            return Err(InventoryError::validation(
                "query",
                "Expected CQL but query parameter is empty",
            ));
        }
        if Self::is_matching_all(query) {
            return Ok(CqlQuery::MatchAll);
        }

        let body = strip_parens(strip_sort_by(query.trim()));
        let terms = split_conjunction(body)?
            .iter()
            .map(|raw| parse_term(raw, query))
            .collect::<Result<Vec<_>>>()?;
        Ok(CqlQuery::All(terms))
    }

    pub fn matches<T: Serialize>(&self, record: &T) -> bool {
        match self {
            CqlQuery::MatchAll => true,
            CqlQuery::All(terms) => match serde_json::to_value(record) {
                Ok(json) => terms.iter().all(|term| term.matches(&json)),
                Err(_) => false,
            },
        }
    }
}

fn lookup<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(json, |node, segment| node.get(segment))
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pieces: Vec<&str> = pattern.split('*').collect();
    if pieces.len() == 1 {
        return pattern == text;
    }

    let mut rest = text;
    for (i, piece) in pieces.iter().enumerate() {
        if piece.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(piece) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == pieces.len() - 1 {
            return rest.ends_with(piece);
        } else {
            match rest.find(piece) {
                Some(idx) => rest = &rest[idx + piece.len()..],
                None => return false,
            }
        }
    }
    true
}

impl Term {
    fn matches_scalar(&self, value: &Value) -> bool {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return false,
        };
        match self.relation {
            Relation::Exact => wildcard_match(&self.value, &text),
            Relation::Matches => {
                wildcard_match(&self.value.to_lowercase(), &text.to_lowercase())
            }
            Relation::NotEqual => text != self.value,
        }
    }

    fn matches(&self, json: &Value) -> bool {
        match lookup(json, &self.field) {
            None | Some(Value::Null) => self.relation == Relation::NotEqual,
            Some(Value::Array(values)) => values.iter().any(|v| self.matches_scalar(v)),
            Some(value) => self.matches_scalar(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn match_all_forms() {
        assert!(CqlQuery::is_matching_all("cql.allRecords=1"));
        assert!(CqlQuery::is_matching_all("  id=*  "));
        assert!(CqlQuery::is_matching_all("(cql.allRecords=1)"));
        assert!(CqlQuery::is_matching_all("((id = *)) sortBy title"));
        assert!(CqlQuery::is_matching_all("CQL.ALLRECORDS=1"));
    }

    #[test]
    fn match_all_is_syntactic() {
        assert!(!CqlQuery::is_matching_all("id==*"));
        assert!(!CqlQuery::is_matching_all("title=*"));
        assert!(!CqlQuery::is_matching_all("cql.allRecords=1 and id=x"));
        assert!(!CqlQuery::is_matching_all(""));
    }

    #[test]
    fn sort_clause_only_outside_quotes() {
        let query = CqlQuery::parse(r#"title=="sortby x""#).unwrap();
        assert!(query.matches(&json!({"title": "sortby x"})));
        assert!(!query.matches(&json!({"title": "other"})));

        let sorted = CqlQuery::parse(r#"title=="a sortBy b" sortBy title/sort.descending"#).unwrap();
        assert!(sorted.matches(&json!({"title": "a sortBy b"})));

        assert!(CqlQuery::is_matching_all("(cql.allRecords=1)sortBy title"));
        assert!(!CqlQuery::is_matching_all("sortbyfield=1"));
    }

    #[test]
    fn blank_query_rejected() {
        let err = CqlQuery::parse("   ").unwrap_err();
        assert_eq!(err.to_string(), "Expected CQL but query parameter is empty");
    }

    #[test]
    fn conjunction_of_terms() {
        let query = CqlQuery::parse(r#"holdingsRecordId=="h-1" and barcode=12*"#).unwrap();
        assert!(query.matches(&json!({"holdingsRecordId": "h-1", "barcode": "1234"})));
        assert!(!query.matches(&json!({"holdingsRecordId": "h-1", "barcode": "999"})));
        assert!(!query.matches(&json!({"holdingsRecordId": "h-2", "barcode": "1234"})));
    }

    #[test]
    fn nested_fields_and_arrays() {
        let query = CqlQuery::parse("status.name=available").unwrap();
        assert!(query.matches(&json!({"status": {"name": "Available"}})));

        let query = CqlQuery::parse("statisticalCodeIds==abc").unwrap();
        assert!(query.matches(&json!({"statisticalCodeIds": ["x", "abc"]})));
    }

    #[test]
    fn not_equal_matches_missing_field() {
        let query = CqlQuery::parse("discoverySuppress<>true").unwrap();
        assert!(query.matches(&json!({})));
        assert!(!query.matches(&json!({"discoverySuppress": true})));
    }

    #[test]
    fn disjunction_unsupported() {
        assert!(CqlQuery::parse("a=1 or b=2").unwrap_err().is_validation());
    }

    #[test]
    fn wildcards() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("ab*", "abc"));
        assert!(wildcard_match("*bc", "abc"));
        assert!(wildcard_match("a*c", "abbbc"));
        assert!(!wildcard_match("a*d", "abc"));
    }
}
