//! Health check and metrics exposition.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::{Result, ServerError};

const AVAILABLE: &str = "available";

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: String,
}

/// Structured health.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub status: String,
    pub system_info: SystemInfo,
}

/// `GET /v1/healthcheck`.
pub async fn healthcheck(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        status: AVAILABLE.into(),
        system_info: SystemInfo {
            environment: state.config.environment.clone(),
            version: state.config.version.clone(),
        },
    })
}

/// `GET /debug/metrics`, only when a recorder is installed.
pub async fn metrics(State(state): State<AppState>) -> Result<String> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(ServerError::NotFound)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use super::*;
    use crate::config::Configuration;
    use crate::router::tests::{json, state};
    use crate::{app, make_request};

    #[tokio::test]
    async fn test_healthcheck() {
        let (state, _) = state(Configuration {
            environment: "staging".into(),
            ..Configuration::default()
        });
        let app = app(state.clone());

        let response =
            make_request(app, Method::GET, "/v1/healthcheck", None, String::new()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let status: Status = json(response).await;
        assert_eq!(
            status,
            Status {
                status: "available".into(),
                system_info: SystemInfo {
                    environment: "staging".into(),
                    version: state.config.version.clone(),
                },
            }
        );
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let (state, _) = state(Configuration::default());
        let response =
            make_request(app(state), Method::GET, "/debug/metrics", None, String::new()).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
