use std::fmt;

/// Which store constraint an insert ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
}

impl fmt::Display for IntegrityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unique => "unique constraint",
            Self::ForeignKey => "foreign key",
            Self::NotNull => "not-null constraint",
            Self::Check => "check constraint",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("integrity violation on {table} ({kind}): {detail}")]
    IntegrityViolation {
        table: &'static str,
        kind: IntegrityKind,
        detail: String,
    },
    #[error("invalid value stored in {table}.{column}: {detail}")]
    Corrupt {
        table: &'static str,
        column: &'static str,
        detail: String,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn integrity(table: &'static str, kind: IntegrityKind, detail: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            table,
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::IntegrityViolation { .. })
    }
}

/// Map an engine error raised while writing `table` into the structured
/// integrity variant when it is a constraint failure.
pub(crate) fn classify(table: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| {
        let kind = match &err {
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation => Some(IntegrityKind::Unique),
                sqlx::error::ErrorKind::ForeignKeyViolation => Some(IntegrityKind::ForeignKey),
                sqlx::error::ErrorKind::NotNullViolation => Some(IntegrityKind::NotNull),
                sqlx::error::ErrorKind::CheckViolation => Some(IntegrityKind::Check),
                _ => None,
            },
            _ => None,
        };
        match (kind, &err) {
            (Some(kind), sqlx::Error::Database(db)) => StoreError::integrity(table, kind, db.message()),
            _ => StoreError::Database(err),
        }
    }
}
