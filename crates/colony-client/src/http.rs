use crate::rpc::{PayloadType, RpcMessage, RpcReply};
use crate::{ClientError, ColonyClient, Result};
use async_trait::async_trait;
use colony_core::{Attribute, Credential, Runtime, TaskAssignment};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_ASSIGN_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra time allowed on top of the long-poll window before a request is abandoned.
const REQUEST_GRACE: Duration = Duration::from_secs(30);

/// HTTP client for the colony server RPC endpoint.
pub struct HttpColonyClient {
    endpoint: String,
    http: reqwest::Client,
    assign_timeout: Duration,
}

impl HttpColonyClient {
    pub fn new(host: &str, port: u16, secure: bool) -> Result<Self> {
        Self::with_assign_timeout(host, port, secure, DEFAULT_ASSIGN_TIMEOUT)
    }

    /// `assign_timeout` is how long the server may hold an assignment
    /// request open while waiting for work.
    pub fn with_assign_timeout(
        host: &str,
        port: u16,
        secure: bool,
        assign_timeout: Duration,
    ) -> Result<Self> {
        let scheme = if secure { "https" } else { "http" };
        let http = reqwest::Client::builder()
            .timeout(assign_timeout + REQUEST_GRACE)
            .build()
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

        Ok(HttpColonyClient {
            endpoint: format!("{}://{}:{}/api", scheme, host, port),
            http,
            assign_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(
        &self,
        payload_type: PayloadType,
        body: Value,
        credential: &Credential,
    ) -> Result<RpcReply> {
        let message = RpcMessage::sign(payload_type, &body, credential)?;
        debug!(payload_type = payload_type.as_str(), endpoint = %self.endpoint, "Sending request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&message)
            .send()
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

        match serde_json::from_str::<RpcReply>(&text) {
            Ok(reply) => Ok(reply),
            Err(_) if !status.is_success() => Err(ClientError::ServerError {
                status: status.as_u16(),
                message: text,
            }),
            Err(e) => Err(ClientError::ProtocolError(format!("malformed reply: {}", e))),
        }
    }
}

#[async_trait]
impl ColonyClient for HttpColonyClient {
    async fn add_runtime(&self, runtime: &Runtime, credential: &Credential) -> Result<Runtime> {
        self.call(PayloadType::AddRuntime, json!({ "runtime": runtime }), credential)
            .await?
            .decode()
    }

    async fn approve_runtime(&self, runtime_id: &str, credential: &Credential) -> Result<()> {
        self.call(PayloadType::ApproveRuntime, json!({ "runtimeid": runtime_id }), credential)
            .await?
            .check()
    }

    async fn delete_runtime(&self, runtime_id: &str, credential: &Credential) -> Result<()> {
        self.call(PayloadType::DeleteRuntime, json!({ "runtimeid": runtime_id }), credential)
            .await?
            .check()
    }

    async fn assign_process(
        &self,
        colony_id: &str,
        credential: &Credential,
    ) -> Result<Option<TaskAssignment>> {
        let body = json!({
            "colonyid": colony_id,
            "timeout": self.assign_timeout.as_secs(),
        });

        let assigned = self
            .call(PayloadType::AssignProcess, body, credential)
            .await
            .and_then(|reply| reply.decode_optional::<TaskAssignment>());

        match assigned {
            Ok(assignment) => Ok(assignment),
            Err(ClientError::ServerError { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn add_attribute(
        &self,
        attribute: &Attribute,
        credential: &Credential,
    ) -> Result<Attribute> {
        self.call(PayloadType::AddAttribute, json!({ "attribute": attribute }), credential)
            .await?
            .decode()
    }

    async fn close_successful(&self, process_id: &str, credential: &Credential) -> Result<()> {
        self.call(PayloadType::CloseSuccessful, json!({ "processid": process_id }), credential)
            .await?
            .check()
    }

    async fn close_failed(
        &self,
        process_id: &str,
        errors: &[String],
        credential: &Credential,
    ) -> Result<()> {
        let body = json!({ "processid": process_id, "errors": errors });
        self.call(PayloadType::CloseFailed, body, credential)
            .await?
            .check()
    }
}
