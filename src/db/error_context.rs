//! Readable messages for failing statements

use sqlx::postgres::PgDatabaseError;

/// What PostgreSQL said about a failed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlErrorContext {
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub code: Option<String>,
}

impl SqlErrorContext {
    pub fn from_sqlx_error(error: &sqlx::Error) -> Self {
        if let Some(db_error) = error.as_database_error() {
            if let Some(pg_error) = db_error.try_downcast_ref::<PgDatabaseError>() {
                return Self {
                    message: pg_error.message().to_string(),
                    detail: pg_error.detail().map(|s| s.to_string()),
                    hint: pg_error.hint().map(|s| s.to_string()),
                    code: Some(pg_error.code().to_string()),
                };
            }
        }

        Self {
            message: error.to_string(),
            detail: None,
            hint: None,
            code: None,
        }
    }

    /// Message naming the failed SQL, for the operator.
    pub fn format(&self, sql: &str) -> String {
        let mut msg = format!("Error while executing SQL query:\n\n  {}\n\n  {}", sql.trim(), self.message);
        if let Some(code) = &self.code {
            msg.push_str(&format!(" ({})", code));
        }
        if let Some(detail) = &self.detail {
            msg.push_str(&format!("\n  Detail: {}", detail));
        }
        if let Some(hint) = &self.hint {
            msg.push_str(&format!("\n  Hint: {}", hint));
        }
        msg
    }
}
