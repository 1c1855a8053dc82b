//! Release update check.
//!
//! Reads the latest release tag from a GitHub-style `releases/latest`
//! endpoint and compares it with the running version. Display only; nothing
//! is downloaded.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Version of this build.
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

/// Outcome of an update check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UpdateStatus {
    UpToDate,
    #[serde(rename_all = "camelCase")]
    Available { latest_version: String },
    /// Check disabled or the endpoint could not be read
    Unknown,
}

pub struct UpdateChecker {
    client: reqwest::Client,
    releases_url: Option<String>,
    current_version: String,
}

impl UpdateChecker {
    pub fn new(releases_url: Option<String>, timeout: Duration) -> Result<Self, AppError> {
        Self::with_version(releases_url, timeout, CURRENT_VERSION)
    }

    pub fn with_version(
        releases_url: Option<String>,
        timeout: Duration,
        current_version: &str,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            releases_url,
            current_version: current_version.to_string(),
        })
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Fetch the latest release tag.
    pub async fn latest_tag(&self) -> Result<String, AppError> {
        let url = self
            .releases_url
            .as_deref()
            .ok_or_else(|| AppError::Validation("Update checks are disabled".to_string()))?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Transport(format!(
                "Release endpoint returned {}",
                response.status()
            )));
        }

        let release: LatestRelease = response.json().await?;
        Ok(release.tag_name)
    }

    /// Compare the latest release with this build. Never fails; problems are
    /// logged and reported as [`UpdateStatus::Unknown`].
    pub async fn check(&self) -> UpdateStatus {
        if self.releases_url.is_none() {
            return UpdateStatus::Unknown;
        }

        match self.latest_tag().await {
            Ok(tag) if normalize(&tag) == normalize(&self.current_version) => {
                UpdateStatus::UpToDate
            }
            Ok(tag) => UpdateStatus::Available {
                latest_version: tag,
            },
            Err(e) => {
                tracing::warn!("Update check failed: {}", e);
                UpdateStatus::Unknown
            }
        }
    }
}

/// Strip the `v.` or `v` prefix release tags carry.
fn normalize(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed
        .strip_prefix("v.")
        .or_else(|| trimmed.strip_prefix('v'))
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/releases/latest", addr)
    }

    fn checker(url: Option<String>) -> UpdateChecker {
        UpdateChecker::with_version(url, Duration::from_secs(5), "1.2.0").unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("v.1.2.0"), "1.2.0");
        assert_eq!(normalize("v1.2.0"), "1.2.0");
        assert_eq!(normalize(" 1.2.0 "), "1.2.0");
    }

    #[tokio::test]
    async fn test_disabled_is_unknown() {
        assert_eq!(checker(None).check().await, UpdateStatus::Unknown);
    }

    #[tokio::test]
    async fn test_same_version_is_up_to_date() {
        let url = serve(Router::new().route(
            "/releases/latest",
            get(|| async { Json(json!({ "tag_name": "v.1.2.0", "name": "Release" })) }),
        ))
        .await;

        assert_eq!(checker(Some(url)).check().await, UpdateStatus::UpToDate);
    }

    #[tokio::test]
    async fn test_newer_tag_is_available() {
        let url = serve(Router::new().route(
            "/releases/latest",
            get(|| async { Json(json!({ "tag_name": "v.1.3.0" })) }),
        ))
        .await;

        assert_eq!(
            checker(Some(url)).check().await,
            UpdateStatus::Available {
                latest_version: "v.1.3.0".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let url = serve(Router::new().route(
            "/releases/latest",
            get(|| async { (StatusCode::FORBIDDEN, "rate limited") }),
        ))
        .await;

        let checker = checker(Some(url));
        assert!(matches!(
            checker.latest_tag().await,
            Err(AppError::Transport(_))
        ));
        assert_eq!(checker.check().await, UpdateStatus::Unknown);
    }
}
