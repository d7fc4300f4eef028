//! reqwest implementation of [`WorkflowBackend`]
//!
//! Paths follow the backend's routing as deployed. Failed responses carry the
//! `{ success, message, errorType, statusCode, errorDetails }` envelope, which
//! is decoded into [`ApiError`]. Some endpoints answer `200` with
//! `success: false`; those are treated as failures too.

use async_trait::async_trait;
use docflow_core::{
    ActionReceipt, ActionRequest, ApiError, ApprovalHistoryEntry, ClientConfig, DocumentId,
    DocumentSnapshot, ErpOperationResult, ErrorEnvelope, ErrorKind, MoveToStatusRequest, Result,
    StepDirection, Transition, WorkflowBackend, WorkflowStatus,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// HTTP backend talking to the document-management REST API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct StepChangeBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<&'a str>,
}

impl HttpBackend {
    /// Build backend from validated configuration
    ///
    /// # Errors
    /// `ApiError::Config` if the configuration is invalid or the HTTP client
    /// cannot be built
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Build backend around an existing reqwest client
    #[must_use]
    pub fn with_client(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    /// Base URL requests are sent to
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        tracing::debug!(path, "GET");
        self.send(self.client.get(self.url(path)), "null").await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        tracing::debug!(path, "POST");
        self.send(self.client.post(self.url(path)).json(body), "{}")
            .await
    }

    /// Send a request and decode its body; `empty_body` stands in for an
    /// empty response.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        empty_body: &str,
    ) -> Result<T> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let envelope = ErrorEnvelope::parse(&body);
            let err = ApiError::from_response(status.as_u16(), envelope.as_ref());
            tracing::warn!(status = status.as_u16(), error = %err, "request failed");
            return Err(err);
        }

        if let Some(envelope) = ErrorEnvelope::reported_failure(&body) {
            let code = envelope.status_code.unwrap_or(400);
            let err = ApiError::from_response(code, Some(&envelope));
            tracing::warn!(status = code, error = %err, "request reported failure");
            return Err(err);
        }

        let body = if body.trim().is_empty() { empty_body } else { body.as_str() };
        serde_json::from_str(body).map_err(ApiError::from)
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout(err.to_string())
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else if err.is_builder() {
        ApiError::Config(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

/// Re-type an untyped ERP failure into the ERP-specific error
fn erp_failure(err: ApiError, kind: ErrorKind) -> ApiError {
    match err {
        ApiError::Validation { message, details } => match kind {
            ErrorKind::ErpLineCreation => ApiError::ErpLineCreation { message, details },
            _ => ApiError::ErpArchival { message, details },
        },
        other => other,
    }
}

#[async_trait]
impl WorkflowBackend for HttpBackend {
    async fn workflow_status(&self, document_id: DocumentId) -> Result<WorkflowStatus> {
        self.get(&format!("Workflow/document/{document_id}/workflow-status"))
            .await
    }

    async fn available_transitions(&self, document_id: DocumentId) -> Result<Vec<Transition>> {
        self.get(&format!("Workflow/document/{document_id}/available-transitions"))
            .await
    }

    async fn approval_history(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<ApprovalHistoryEntry>> {
        self.get(&format!("Approval/history/{document_id}")).await
    }

    async fn document(&self, document_id: DocumentId) -> Result<DocumentSnapshot> {
        self.get(&format!("Documents/{document_id}")).await
    }

    async fn perform_action(&self, request: &ActionRequest) -> Result<ActionReceipt> {
        self.post("Workflow/perform-action", request).await
    }

    async fn move_to_status(&self, request: &MoveToStatusRequest) -> Result<ActionReceipt> {
        self.post("Workflow/move-to-status", request).await
    }

    async fn change_step(
        &self,
        document_id: DocumentId,
        direction: StepDirection,
        comments: Option<String>,
    ) -> Result<ActionReceipt> {
        let body = StepChangeBody {
            comments: comments.as_deref(),
        };
        self.post(&format!("Circuit/document/{document_id}/{direction}"), &body)
            .await
    }

    async fn archive_to_erp(&self, document_id: DocumentId) -> Result<ErpOperationResult> {
        self.post(&format!("Documents/{document_id}/archive-to-erp"), &())
            .await
            .map_err(|e| erp_failure(e, ErrorKind::ErpArchival))
    }

    async fn create_erp_lines(&self, document_id: DocumentId) -> Result<ErpOperationResult> {
        self.post(&format!("Lignes/document/{document_id}/create-in-erp"), &())
            .await
            .map_err(|e| erp_failure(e, ErrorKind::ErpLineCreation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(&ClientConfig::new().with_base_url(base)).unwrap()
    }

    #[test]
    fn url_joins_without_double_slash() {
        let b = backend("https://dms.example.com/api/");
        assert_eq!(b.base_url(), "https://dms.example.com/api");
        assert_eq!(
            b.url("/Workflow/move-to-status"),
            "https://dms.example.com/api/Workflow/move-to-status"
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = HttpBackend::new(&ClientConfig::new()).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn untyped_erp_failures_are_retyped() {
        let err = ApiError::Validation {
            message: "no ERP mapping".into(),
            details: None,
        };
        assert_eq!(
            erp_failure(err, ErrorKind::ErpLineCreation).kind(),
            ErrorKind::ErpLineCreation
        );
        let err = erp_failure(ApiError::Network("down".into()), ErrorKind::ErpArchival);
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
