use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{mentions_lock, RemoteStore};
use crate::error::RemoteError;
use crate::table::Table;

/// Upper bound on how much of an error body is echoed into logs.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Workbook served over HTTP: `GET` returns the JSON table, `PUT` replaces it.
///
/// Credentials are passed through as an opaque bearer token; obtaining them is
/// the host's business.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    url: reqwest::Url,
    bearer_token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| RemoteError::Unavailable(format!("invalid remote url {url:?}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url,
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url.clone());
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn error_body(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

fn transport_error(op: &str, err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Unavailable(format!("{op} timed out"))
    } else {
        RemoteError::Unavailable(format!("{op}: {err}"))
    }
}

/// Classify a failed upload response.
fn upload_failure(status: StatusCode, body: &str) -> RemoteError {
    let message = format!("upload rejected with {status}: {body}");
    let locked = matches!(status, StatusCode::LOCKED | StatusCode::CONFLICT) || mentions_lock(body);
    if locked {
        RemoteError::Locked(message)
    } else {
        RemoteError::Unavailable(message)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch(&self) -> Result<Table, RemoteError> {
        let response = self
            .request(reqwest::Method::GET)
            .send()
            .await
            .map_err(|e| transport_error("fetch", e))?;
        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(RemoteError::Unavailable(format!("fetch failed with {status}: {body}")));
        }
        response
            .json::<Table>()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("malformed remote document: {e}")))
    }

    async fn upload(&self, table: &Table) -> Result<(), RemoteError> {
        let response = self
            .request(reqwest::Method::PUT)
            .json(table)
            .send()
            .await
            .map_err(|e| transport_error("upload", e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = error_body(response).await;
        Err(upload_failure(status, &body))
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_statuses_and_lock_messages_map_to_locked() {
        assert!(upload_failure(StatusCode::LOCKED, "").is_locked());
        assert!(upload_failure(StatusCode::CONFLICT, "").is_locked());
        assert!(upload_failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "The file KPISystem.xlsx is locked for shared use by admin"
        )
        .is_locked());
        assert!(!upload_failure(StatusCode::BAD_GATEWAY, "upstream down").is_locked());
        assert!(!upload_failure(StatusCode::UNAUTHORIZED, "").is_locked());
    }

    #[test]
    fn invalid_url_is_rejected_up_front() {
        let err = HttpRemoteStore::new("not a url", Duration::from_secs(1)).expect_err("invalid");
        assert!(matches!(err, RemoteError::Unavailable(_)));
    }
}
