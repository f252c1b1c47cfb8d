use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("permission denied at {0}")]
    PermissionDenied(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn decode(path: &str, source: serde_json::Error) -> Self {
        Self::Decode {
            path: path.to_string(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("remote read failed: {0}")]
    RemoteRead(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("permission rejected: {0}")]
    Permission(String),
    #[error("transient network failure: {0}")]
    NetworkTransient(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for GameError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::PermissionDenied(path) => Self::Permission(path),
            other => Self::Store(other),
        }
    }
}

impl GameError {
    /// Text an admin banner can show as-is.
    pub fn user_message(&self) -> String {
        match self {
            Self::Authentication(message) | Self::Validation(message) => message.clone(),
            Self::Permission(path) => format!(
                "Permissão negada em '{path}'. Atualize as regras do banco de dados para liberar este acesso."
            ),
            Self::RemoteRead(_) | Self::Store(_) => {
                "Erro ao acessar o banco de dados. Tente novamente.".to_string()
            }
            Self::NetworkTransient(_) => "Falha de rede. Tente novamente.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_store_errors_become_permission_game_errors() {
        let error: GameError = StoreError::PermissionDenied("users".to_string()).into();
        assert!(matches!(error, GameError::Permission(ref path) if path == "users"));
        assert!(error.user_message().contains("regras"));
    }

    #[test]
    fn validation_message_is_passed_through() {
        let error = GameError::Validation("A URL do modelo .glb é obrigatória.".to_string());
        assert_eq!(error.user_message(), "A URL do modelo .glb é obrigatória.");
    }
}
