use thiserror::Error;

/// Errors surfaced by the mkdb core.
///
/// Each variant maps to one failure class with its own handling policy:
/// validation and conflicts are never retried, runtime failures are fatal on
/// creative paths and advisory on destructive ones, storage failures are always
/// fatal.
#[derive(Error, Debug)]
pub enum Error {
    #[error("entrada inválida: {0}")]
    Validation(String),

    #[error("não encontrado: {0}")]
    NotFound(String),

    #[error("conflito: {0}")]
    Conflict(String),

    #[error("falha no runtime de containers ({context}): {message}")]
    Runtime { context: String, message: String },

    #[error("falha de armazenamento ({context}): {source}")]
    Storage {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("falha de integridade: {0}")]
    Integrity(String),

    #[error("{operation} não é suportado para {db_type}")]
    Unsupported {
        operation: &'static str,
        db_type: String,
    },

    #[error("erro de E/S ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn runtime(context: impl Into<String>, err: anyhow::Error) -> Self {
        Self::Runtime {
            context: context.into(),
            message: format!("{err:#}"),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Attaches an operation description to SQLite failures.
pub(crate) trait StorageContext<T> {
    fn storage(self, context: &str) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, rusqlite::Error> {
    fn storage(self, context: &str) -> Result<T> {
        self.map_err(|source| Error::Storage {
            context: context.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("exit status 125").context("criando container mkdb-devdb");
        let err = Error::runtime("criar devdb", inner);

        let msg = err.to_string();
        assert!(msg.contains("criar devdb"));
        assert!(msg.contains("exit status 125"));
    }

    #[test]
    fn unsupported_names_operation_and_type() {
        let err = Error::Unsupported {
            operation: "criação de usuário",
            db_type: "redis".to_string(),
        };
        assert_eq!(err.to_string(), "criação de usuário não é suportado para redis");
    }
}
