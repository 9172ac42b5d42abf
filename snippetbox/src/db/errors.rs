use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        /// Columns named by the driver message, e.g. `users.email` yields `["email"]`
        columns: Vec<String>,
        message: String,
    },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    /// Whether this is a unique violation of the named constraint on `table.column`.
    ///
    /// SQLite reports `UNIQUE constraint failed: users.email` without the constraint name, so
    /// either the constraint name or the table/column pair is enough to match.
    pub fn is_unique_violation_of(&self, constraint_name: &str, table_name: &str, column: &str) -> bool {
        match self {
            DbError::UniqueViolation {
                constraint,
                table,
                columns,
                message,
            } => {
                constraint.as_deref() == Some(constraint_name)
                    || message.contains(constraint_name)
                    || (table.as_deref() == Some(table_name) && columns.iter().any(|c| c == column))
            }
            _ => false,
        }
    }
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let message = db_err.message().to_string();
                let (table, columns) = parse_constraint_target(&message);
                DbError::UniqueViolation {
                    constraint: db_err.constraint().map(|s| s.to_string()),
                    table: db_err.table().map(|s| s.to_string()).or(table),
                    columns,
                    message,
                }
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Extract the table and columns from an SQLite constraint message such as
/// `UNIQUE constraint failed: users.email` or `... failed: t.a, t.b`.
fn parse_constraint_target(message: &str) -> (Option<String>, Vec<String>) {
    let Some((_, target)) = message.rsplit_once(": ") else {
        return (None, Vec::new());
    };
    let mut table = None;
    let mut columns = Vec::new();
    for qualified in target.split(',').map(str::trim) {
        if let Some((t, c)) = qualified.split_once('.') {
            table.get_or_insert_with(|| t.to_string());
            columns.push(c.to_string());
        }
    }
    (table, columns)
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
