mod http;
mod rpc;

pub use http::HttpColonyClient;
pub use rpc::{Failure, PayloadType, RpcMessage, RpcReply};

use async_trait::async_trait;
use colony_core::{Attribute, Credential, Runtime, TaskAssignment};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Worker-side view of the colony server.
///
/// Every call is signed with the supplied credential: the colony key for
/// runtime management, the worker's own key for process traffic.
#[async_trait]
pub trait ColonyClient: Send + Sync {
    async fn add_runtime(&self, runtime: &Runtime, credential: &Credential) -> Result<Runtime>;

    async fn approve_runtime(&self, runtime_id: &str, credential: &Credential) -> Result<()>;

    async fn delete_runtime(&self, runtime_id: &str, credential: &Credential) -> Result<()>;

    /// Request one assignment. `Ok(None)` means the server had no work.
    async fn assign_process(
        &self,
        colony_id: &str,
        credential: &Credential,
    ) -> Result<Option<TaskAssignment>>;

    async fn add_attribute(
        &self,
        attribute: &Attribute,
        credential: &Credential,
    ) -> Result<Attribute>;

    async fn close_successful(&self, process_id: &str, credential: &Credential) -> Result<()>;

    async fn close_failed(
        &self,
        process_id: &str,
        errors: &[String],
        credential: &Credential,
    ) -> Result<()>;
}
