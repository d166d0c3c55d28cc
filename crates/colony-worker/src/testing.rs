//! Shared fixtures for unit tests.

use crate::context::WorkerContext;
use async_trait::async_trait;
use colony_client::{ClientError, ColonyClient, Result};
use colony_core::{
    Attribute, AttributeKind, Credential, ResourceDescriptor, Runtime, TaskAssignment,
    WorkerIdentity, WorkerProfile,
};

mockall::mock! {
    pub Colony {}

    #[async_trait]
    impl ColonyClient for Colony {
        async fn add_runtime(&self, runtime: &Runtime, credential: &Credential) -> Result<Runtime>;
        async fn approve_runtime(&self, runtime_id: &str, credential: &Credential) -> Result<()>;
        async fn delete_runtime(&self, runtime_id: &str, credential: &Credential) -> Result<()>;
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
}

pub fn profile() -> WorkerProfile {
    WorkerProfile {
        runtime_type: "fibonacci".into(),
        name: "fibonacci".into(),
        resources: ResourceDescriptor {
            cpu: "test cpu".into(),
            cores: 4,
            memory: 8192,
            gpu: String::new(),
            gpus: 0,
        },
    }
}

pub fn context() -> WorkerContext {
    WorkerContext::new(
        WorkerIdentity::generate().unwrap(),
        "colony-1",
        Credential::generate().unwrap(),
        profile(),
    )
}

pub fn assignment(id: &str, key: &str, value: &str) -> TaskAssignment {
    TaskAssignment::new(id, vec![Attribute::new(id, AttributeKind::Env, key, value)])
}

pub fn refused() -> ClientError {
    ClientError::ConnectionError("connection refused".into())
}

pub fn server_error(status: u16, message: &str) -> ClientError {
    ClientError::ServerError {
        status,
        message: message.into(),
    }
}
