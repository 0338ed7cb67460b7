//! Coarse lexical gate run before any generated SQL reaches the store.
//!
//! This is a case-insensitive substring scan, not a parser. It rejects
//! legitimate statements whose identifiers or literals happen to contain a
//! deny-listed word (a `created_at` column contains `CREATE`, an
//! `alternate_email` column contains `ALTER`). That is a known limitation;
//! there is no allow-list.

use tracing::warn;

pub const DENY_LIST: &[&str] = &[
    "DROP",
    "TRUNCATE",
    "DELETE FROM",
    "ALTER",
    "CREATE",
    "GRANT",
    "REVOKE",
    "--",
    ";--",
    "/*",
    "*/",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Potentially unsafe query detected: contains '{keyword}'")]
pub struct UnsafeSql {
    pub keyword: &'static str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyValidator;

impl SafetyValidator {
    pub fn check(&self, sql: &str) -> Result<(), UnsafeSql> {
        let upper = sql.to_uppercase();
        match DENY_LIST.iter().find(|keyword| upper.contains(**keyword)) {
            Some(&keyword) => {
                warn!("Potentially dangerous keyword found: {}", keyword);
                Err(UnsafeSql { keyword })
            }
            None => Ok(()),
        }
    }

    pub fn is_safe(&self, sql: &str) -> bool {
        self.check(sql).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_select_is_safe() {
        let v = SafetyValidator;
        assert!(v.is_safe("SELECT id, total FROM orders WHERE total > 10"));
        assert!(v.is_safe("UPDATE orders SET total = 0 WHERE id = 1"));
        assert!(v.is_safe("INSERT INTO orders (id) VALUES (1)"));
    }

    #[test]
    fn test_drop_table_is_rejected() {
        let v = SafetyValidator;
        assert!(!v.is_safe("DROP TABLE orders;"));
        assert_eq!(v.check("drop table orders").unwrap_err().keyword, "DROP");
    }

    #[test]
    fn test_every_deny_list_entry_rejects_case_insensitively() {
        let v = SafetyValidator;
        for keyword in DENY_LIST {
            let sql = format!("select 1 {} x", keyword.to_lowercase());
            assert!(!v.is_safe(&sql), "{keyword} should be rejected");
        }
    }

    #[test]
    fn test_comment_sequences_are_rejected() {
        let v = SafetyValidator;
        assert!(!v.is_safe("SELECT 1; -- trailing"));
        assert!(!v.is_safe("SELECT /* hint */ 1"));
        assert!(!v.is_safe("SELECT 1;--"));
    }

    #[test]
    fn test_known_false_positive_on_identifier() {
        // Lexical scan, not a parser: identifiers containing deny-listed words are rejected.
        let v = SafetyValidator;
        assert!(!v.is_safe("SELECT create_date FROM orders"));
        assert!(!v.is_safe("SELECT * FROM orders WHERE note = 'dropped'"));
    }

    #[test]
    fn test_bare_delete_without_from_passes() {
        let v = SafetyValidator;
        assert!(v.is_safe("SELECT deleted FROM audit"));
    }
}
