use crate::playback::PlaybackState;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("request to `{route}` failed: {message}")]
    FetchFailure { route: String, message: String },

    #[error("`{route}` returned no {what}")]
    EmptyResult { route: String, what: String },

    #[error("unexpected response from `{route}`: {message}")]
    MalformedResponse { route: String, message: String },
}

impl CatalogError {
    pub fn fetch(route: &str, message: impl Into<String>) -> Self {
        CatalogError::FetchFailure {
            route: route.to_string(),
            message: message.into(),
        }
    }

    pub fn empty(route: &str, what: &str) -> Self {
        CatalogError::EmptyResult {
            route: route.to_string(),
            what: what.to_string(),
        }
    }

    pub fn malformed(route: &str, message: impl Into<String>) -> Self {
        CatalogError::MalformedResponse {
            route: route.to_string(),
            message: message.into(),
        }
    }

    pub fn route(&self) -> &str {
        match self {
            CatalogError::FetchFailure { route, .. }
            | CatalogError::EmptyResult { route, .. }
            | CatalogError::MalformedResponse { route, .. } => route,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: PlaybackState,
        action: &'static str,
    },

    #[error("episode {episode} is not in the episode list")]
    UnknownEpisode { episode: u32 },

    #[error("no source with quality `{quality}`")]
    UnknownQuality { quality: String },
}
