use crate::client::credentials::CredentialProvider;
use crate::client::remote::RemoteAiClient;
use crate::client::validation;
use crate::error_code::ErrorKind;
use crate::resilience::Operation;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Correlation header attached to every call.
pub const REQUEST_ID_HEADER: &str = "x-ai-edit-request-id";

/// How much of an error body is kept in error messages.
const BODY_EXCERPT_LEN: usize = 200;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBody<'a> {
    image: String,
    request_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask: Option<String>,
    prompt: &'a str,
    request_id: &'a str,
}

#[derive(Deserialize)]
struct AnalyzeReply {
    text: String,
}

#[derive(Deserialize)]
struct GenerateReply {
    image: String,
}

/// reqwest-backed [`RemoteAiClient`].
///
/// Every reqwest failure and non-success status is classified here; callers only ever see
/// crate [`Error`]s.
pub struct HttpRemoteClient {
    client: reqwest::Client,
    base_url: Url,
    credential: Arc<dyn CredentialProvider>,
    max_payload_bytes: usize,
}

impl HttpRemoteClient {
    pub(crate) fn new(
        client: reqwest::Client,
        base_url: Url,
        credential: Arc<dyn CredentialProvider>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            client,
            base_url,
            credential,
            max_payload_bytes,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, op: Operation) -> Result<Url> {
        let path = match op {
            Operation::Analyze => "v1/analyze",
            Operation::Generate => "v1/generate",
        };
        self.base_url.join(path).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid endpoint: {}", e),
                ErrorContext::new().with_operation(op.as_str()),
            )
        })
    }

    async fn post<B, R>(
        &self,
        op: Operation,
        body: &B,
        request_id: &str,
        sent_bytes: usize,
        timeout: Duration,
    ) -> Result<R>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint(op)?;
        let token = self.credential.bearer()?;

        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .bearer_auth(token)
            // Our own correlation id. The service may ignore it; logs on both sides can use it.
            .header(REQUEST_ID_HEADER, request_id)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_reqwest(op, request_id, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(op, request_id, status.as_u16(), &body, sent_bytes));
        }

        response.json::<R>().await.map_err(|e| {
            if e.is_timeout() {
                return classify_reqwest(op, request_id, timeout, e);
            }
            Error::transient_with_context(
                format!("malformed response body: {}", e),
                ErrorContext::new()
                    .with_operation(op.as_str())
                    .with_request_id(request_id)
                    .with_status_code(status.as_u16())
                    .with_source("http_transport"),
            )
        })
    }
}

#[async_trait]
impl RemoteAiClient for HttpRemoteClient {
    async fn analyze(&self, image: &Bytes, timeout: Duration) -> Result<String> {
        validation::validate_analyze(image, self.max_payload_bytes)?;
        let request_id = uuid::Uuid::new_v4().to_string();
        let body = AnalyzeBody {
            image: STANDARD.encode(image),
            request_id: &request_id,
        };
        let reply: AnalyzeReply = self
            .post(Operation::Analyze, &body, &request_id, image.len(), timeout)
            .await?;
        Ok(reply.text)
    }

    async fn generate(
        &self,
        image: &Bytes,
        mask: Option<&Bytes>,
        prompt: &str,
        timeout: Duration,
    ) -> Result<Bytes> {
        let prompt = validation::validate_generate(
            image,
            mask.map(|m| m.as_ref()),
            prompt,
            self.max_payload_bytes,
        )?;
        let request_id = uuid::Uuid::new_v4().to_string();
        let body = GenerateBody {
            image: STANDARD.encode(image),
            mask: mask.map(|m| STANDARD.encode(m)),
            prompt,
            request_id: &request_id,
        };
        let sent_bytes = image.len().max(mask.map_or(0, |m| m.len()));
        let reply: GenerateReply = self
            .post(Operation::Generate, &body, &request_id, sent_bytes, timeout)
            .await?;

        STANDARD
            .decode(reply.image.as_bytes())
            .map(Bytes::from)
            .map_err(|e| {
                Error::transient_with_context(
                    format!("generated image is not valid base64: {}", e),
                    ErrorContext::new()
                        .with_operation(Operation::Generate.as_str())
                        .with_request_id(request_id.as_str())
                        .with_source("http_transport"),
                )
            })
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
///
/// `sent_bytes` is the size of the largest payload in the rejected request; it is reported when
/// the service answers 413 with its own, unknown limit.
pub fn classify_status(
    op: Operation,
    request_id: &str,
    status: u16,
    body: &str,
    sent_bytes: usize,
) -> Error {
    let excerpt: String = body.chars().take(BODY_EXCERPT_LEN).collect();
    let context = ErrorContext::new()
        .with_operation(op.as_str())
        .with_request_id(request_id)
        .with_status_code(status)
        .with_source("http_transport");
    let message = if excerpt.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, excerpt)
    };

    match ErrorKind::from_http_status(status) {
        Some(ErrorKind::Auth) => Error::auth_with_context(message, context),
        Some(ErrorKind::PayloadTooLarge) => Error::PayloadTooLarge {
            size: sent_bytes,
            limit: 0,
            context: context.with_details(format!("limit enforced by service; {}", message)),
        },
        Some(ErrorKind::Validation) => Error::validation_with_context(message, context),
        Some(ErrorKind::TransientNetwork) => Error::transient_with_context(message, context),
        _ => Error::internal_with_context(message, context),
    }
}

fn classify_reqwest(op: Operation, request_id: &str, timeout: Duration, e: reqwest::Error) -> Error {
    let context = ErrorContext::new()
        .with_operation(op.as_str())
        .with_request_id(request_id)
        .with_source("http_transport");
    if e.is_timeout() {
        Error::timeout(timeout, context)
    } else if e.is_builder() {
        Error::internal_with_context(e.to_string(), context)
    } else {
        // connect, request, body and decode failures are all worth another attempt
        Error::transient_with_context(e.to_string(), context)
    }
}
