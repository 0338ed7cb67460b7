use regex::Regex;
use std::sync::LazyLock;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)\s+|'(?:[^']|'')*'|"(?:[^"]|"")*"|--[^\n]*|/\*.*?\*/|[A-Za-z_][A-Za-z0-9_$]*|\d[\w.]*|<=|>=|<>|!=|::|\|\||\S"#,
    )
    .expect("valid token regex")
});

const KEYWORDS: &[&str] = &[
    "ALL", "AND", "ANY", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "CROSS", "DELETE",
    "DESC", "DISTINCT", "ELSE", "END", "EXCEPT", "EXISTS", "FALSE", "FILTER", "FROM", "FULL",
    "GROUP", "HAVING", "ILIKE", "IN", "INNER", "INSERT", "INTERSECT", "INTERVAL", "INTO", "IS",
    "JOIN", "LEFT", "LIKE", "LIMIT", "NATURAL", "NOT", "NULL", "NULLS", "OFFSET", "ON", "OR",
    "ORDER", "OUTER", "OVER", "PARTITION", "QUALIFY", "RECURSIVE", "RETURNING", "RIGHT",
    "SELECT", "SET", "THEN", "TRUE", "UNION", "UPDATE", "USING", "VALUES", "WHEN", "WHERE",
    "WINDOW", "WITH",
];

/// Always start a new line.
const CLAUSE_STARTERS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION",
    "EXCEPT", "INTERSECT", "VALUES", "SET", "INSERT", "UPDATE", "DELETE", "RETURNING",
    "QUALIFY", "WINDOW",
];

/// Start a new line only when they open a join.
const JOIN_PREFIXES: &[&str] = &["LEFT", "RIGHT", "FULL", "INNER", "CROSS", "NATURAL"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Space,
    Word,
    LineComment,
    Other,
}

fn classify(token: &str) -> Kind {
    let first = token.chars().next().unwrap_or(' ');
    if first.is_whitespace() {
        Kind::Space
    } else if token.starts_with("--") {
        Kind::LineComment
    } else if first.is_ascii_alphabetic() || first == '_' {
        Kind::Word
    } else {
        Kind::Other
    }
}

fn is_keyword(upper: &str) -> bool {
    KEYWORDS.contains(&upper)
}

/// Splits SQL into lexical tokens, whitespace included. `None` when a string
/// literal or quoted identifier is left open.
pub(crate) fn tokenize(sql: &str) -> Option<Vec<&str>> {
    let tokens: Vec<&str> = TOKEN.find_iter(sql).map(|m| m.as_str()).collect();
    if tokens.iter().any(|t| *t == "'" || *t == "\"") {
        return None;
    }
    Some(tokens)
}

/// Formats SQL for display: keywords upper-cased, major clauses on their own
/// lines, AND/OR conditions indented, whitespace collapsed. Literals and
/// identifiers are untouched and no token is added or removed, so the result
/// is the same statement. Input that cannot be tokenized is returned as is.
pub fn format_sql(sql: &str) -> String {
    let Some(tokens) = tokenize(sql) else {
        return sql.trim().to_string();
    };

    let words: Vec<(usize, String)> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| classify(t) != Kind::Space)
        .map(|(i, t)| (i, t.to_uppercase()))
        .collect();

    let mut out = String::with_capacity(sql.len() + 16);
    let mut depth: usize = 0;
    let mut pending_space = false;
    let mut between_open = false;
    let mut prev: Option<(Kind, String)> = None;

    for (pos, (idx, upper)) in words.iter().enumerate() {
        let token = tokens[*idx];
        let kind = classify(token);
        pending_space |= *idx > 0 && classify(tokens[idx - 1]) == Kind::Space;

        let next_upper = words.get(pos + 1).map(|(_, u)| u.as_str());
        let prev_upper = prev.as_ref().map(|(_, u)| u.as_str());
        let keyword = kind == Kind::Word && is_keyword(upper);

        let mut indent = None;
        if keyword {
            let opens_join = JOIN_PREFIXES.contains(&upper.as_str())
                && matches!(next_upper, Some("JOIN") | Some("OUTER"));
            let bare_join = upper == "JOIN"
                && !matches!(
                    prev_upper,
                    Some("LEFT" | "RIGHT" | "FULL" | "INNER" | "CROSS" | "NATURAL" | "OUTER")
                );
            let continues_statement = (upper == "FROM" && prev_upper == Some("DELETE"))
                || (upper == "SELECT" && prev_upper == Some("("));

            if (CLAUSE_STARTERS.contains(&upper.as_str()) || opens_join || bare_join)
                && !continues_statement
            {
                indent = Some(depth);
            } else if upper == "AND" && between_open {
                between_open = false;
            } else if upper == "AND" || upper == "OR" {
                indent = Some(depth + 1);
            }

            if upper == "BETWEEN" {
                between_open = true;
            }
        }
        if matches!(prev, Some((Kind::LineComment, _))) {
            indent.get_or_insert(depth);
        }

        if out.is_empty() {
            // first token never gets a leading newline
        } else if let Some(level) = indent {
            while out.ends_with(' ') {
                out.pop();
            }
            out.push('\n');
            out.push_str(&"  ".repeat(level));
        } else if pending_space {
            out.push(' ');
        }

        if keyword {
            out.push_str(upper);
        } else {
            out.push_str(token);
        }

        match token {
            "(" => depth += 1,
            ")" => depth = depth.saturating_sub(1),
            _ => {}
        }
        pending_space = false;
        prev = Some((kind, upper.clone()));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(sql: &str) -> Vec<String> {
        tokenize(sql)
            .unwrap()
            .into_iter()
            .filter(|t| classify(t) != Kind::Space)
            .map(|t| match classify(t) {
                Kind::Word => t.to_uppercase(),
                _ => t.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_clauses_on_own_lines_and_keywords_upper() {
        let sql = "select o.id, sum(o.total) as total from orders o left join customers c on c.id = o.customer_id where o.total > 10 and c.name like 'A%' group by o.id order by total desc limit 5";
        let formatted = format_sql(sql);
        assert_eq!(
            formatted,
            "SELECT o.id, sum(o.total) AS total\n\
             FROM orders o\n\
             LEFT JOIN customers c ON c.id = o.customer_id\n\
             WHERE o.total > 10\n  \
             AND c.name LIKE 'A%'\n\
             GROUP BY o.id\n\
             ORDER BY total DESC\n\
             LIMIT 5"
        );
    }

    #[test]
    fn test_literals_and_quoted_identifiers_untouched() {
        let formatted = format_sql("select \"Order Total\" from t where note = 'select from where'");
        assert_eq!(
            formatted,
            "SELECT \"Order Total\"\nFROM t\nWHERE note = 'select from where'"
        );
    }

    #[test]
    fn test_round_trip_preserves_token_stream() {
        let cases = [
            "SELECT * FROM orders",
            "select count(*)from orders where id in (select order_id from items where qty>=2)",
            "update orders set total = total * 1.1 where id between 1 and 10 or id = 42",
            "insert into orders (id, total) values (1, 2.5), (2, 3.0)",
            "with recent as (select * from orders) select * from recent union all select * from orders",
            "select a::int, b || 'x' from t -- trailing\nwhere c <> 1",
        ];
        for sql in cases {
            assert_eq!(normalized(&format_sql(sql)), normalized(sql), "{sql}");
        }
    }

    #[test]
    fn test_formatting_is_idempotent() {
        let sql = "select a from t where x between 1 and 2 and y = 3 or z is null order by a";
        let once = format_sql(sql);
        assert_eq!(format_sql(&once), once);
    }

    #[test]
    fn test_between_and_stays_inline() {
        let formatted = format_sql("select a from t where x between 1 and 2 and y = 3");
        assert_eq!(formatted, "SELECT a\nFROM t\nWHERE x BETWEEN 1 AND 2\n  AND y = 3");
    }

    #[test]
    fn test_line_comment_keeps_following_token_on_next_line() {
        let formatted = format_sql("select 1 -- note\n, 2");
        assert_eq!(formatted, "SELECT 1 -- note\n, 2");
    }

    #[test]
    fn test_subquery_select_is_not_broken() {
        let formatted = format_sql("select * from (select id from t) s");
        assert_eq!(formatted, "SELECT *\nFROM (SELECT id\n  FROM t) s");
    }

    #[test]
    fn test_unterminated_literal_returned_unchanged() {
        assert_eq!(format_sql("  select 'oops from t "), "select 'oops from t");
    }

    #[test]
    fn test_delete_from_stays_together() {
        assert_eq!(format_sql("delete from t where id = 1"), "DELETE FROM t\nWHERE id = 1");
    }

    #[test]
    fn test_left_function_is_not_a_join() {
        assert_eq!(format_sql("select left(name, 2) from t"), "SELECT LEFT(name, 2)\nFROM t");
    }
}
