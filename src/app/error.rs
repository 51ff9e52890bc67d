use thiserror::Error;

#[derive(Error, Debug)]
pub enum NanorssError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Store is closed")]
    Closed,

    #[error("{0} not found")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Username {0} is already in use")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Password error: {0}")]
    Password(#[from] bcrypt::BcryptError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{failed} of {total} items failed, first error: {first}")]
    Aggregate {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, NanorssError>;

/// Collects per-item failures of a multi-item operation.
///
/// Every item is attempted; `finish` turns any recorded failure into a single
/// [`NanorssError::Aggregate`].
#[derive(Debug, Default)]
pub struct ErrorCollector {
    total: usize,
    failed: usize,
    first: Option<String>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        self.total += 1;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.failed += 1;
                if self.first.is_none() {
                    self.first = Some(e.to_string());
                }
                None
            }
        }
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn finish(self) -> Result<()> {
        match self.first {
            None => Ok(()),
            Some(first) => Err(NanorssError::Aggregate {
                failed: self.failed,
                total: self.total,
                first,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_without_failures() {
        let mut errors = ErrorCollector::new();
        assert_eq!(errors.record(Ok::<_, NanorssError>(1)), Some(1));
        assert!(errors.finish().is_ok());
    }

    #[test]
    fn test_collector_reports_first_failure() {
        let mut errors = ErrorCollector::new();
        errors.record(Ok::<_, NanorssError>(()));
        errors.record::<()>(Err(NanorssError::Other("first".into())));
        errors.record::<()>(Err(NanorssError::Other("second".into())));

        match errors.finish() {
            Err(NanorssError::Aggregate {
                failed,
                total,
                first,
            }) => {
                assert_eq!(failed, 2);
                assert_eq!(total, 3);
                assert_eq!(first, "first");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
