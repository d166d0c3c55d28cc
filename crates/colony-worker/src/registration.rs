//! Runtime registration with the colony: add, approve, delete.

use crate::context::WorkerContext;
use colony_client::ColonyClient;
use colony_core::{Credential, IdStore, Result, WorkerError};
use std::sync::Arc;
use tracing::{error, info};

/// Drives the registration handshake. All calls are signed with the
/// colony credential.
pub struct Registrar {
    client: Arc<dyn ColonyClient>,
}

impl Registrar {
    pub fn new(client: Arc<dyn ColonyClient>) -> Self {
        Registrar { client }
    }

    pub async fn register(&self, context: &WorkerContext) -> Result<()> {
        let runtime = context.runtime();
        info!(
            runtime_id = %runtime.id,
            runtime_type = %runtime.runtime_type,
            name = %runtime.name,
            cores = runtime.cores,
            mem = runtime.mem,
            "Registering runtime"
        );

        self.client
            .add_runtime(&runtime, context.colony_credential())
            .await
            .map(|_| ())
            .map_err(|e| WorkerError::Registration(e.to_string()))
    }

    pub async fn approve(&self, context: &WorkerContext) -> Result<()> {
        info!(runtime_id = %context.runtime_id(), "Approving runtime");

        self.client
            .approve_runtime(context.runtime_id(), context.colony_credential())
            .await
            .map_err(|e| WorkerError::Approval(e.to_string()))
    }

    /// Register, then approve. Approval is attempted even when registration
    /// failed; the first error is returned and every error is logged.
    pub async fn enroll(&self, context: &WorkerContext) -> Result<()> {
        let registered = self.register(context).await;
        if let Err(e) = &registered {
            error!("{}", e);
        }

        let approved = self.approve(context).await;
        if let Err(e) = &approved {
            error!("{}", e);
        }

        registered.and(approved)
    }

    /// One-shot removal. No retry.
    pub async fn deregister(&self, runtime_id: &str, colony_credential: &Credential) -> Result<()> {
        info!(runtime_id = %runtime_id, "Deregistering runtime");

        self.client
            .delete_runtime(runtime_id, colony_credential)
            .await
            .map_err(|e| WorkerError::Deregistration(e.to_string()))
    }

    /// Read the id saved by an earlier run and deregister it.
    pub async fn deregister_persisted(
        &self,
        store: &IdStore,
        colony_credential: &Credential,
    ) -> Result<String> {
        let runtime_id = store.load()?;
        self.deregister(&runtime_id, colony_credential).await?;
        Ok(runtime_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, refused, server_error, MockColony};
    use mockall::Sequence;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_enroll_registers_then_approves() {
        let context = context();
        let expected_id = context.runtime_id().to_string();
        let colony_key = context.colony_credential().public_key_hex();

        let mut seq = Sequence::new();
        let mut client = MockColony::new();
        let (id, key) = (expected_id.clone(), colony_key.clone());
        client
            .expect_add_runtime()
            .withf(move |runtime, credential| {
                runtime.id == id
                    && runtime.colony_id == "colony-1"
                    && runtime.runtime_type == "fibonacci"
                    && credential.public_key_hex() == key
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|runtime, _| Ok(runtime.clone()));
        let (id, key) = (expected_id.clone(), colony_key.clone());
        client
            .expect_approve_runtime()
            .withf(move |runtime_id, credential| {
                runtime_id == id && credential.public_key_hex() == key
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let registrar = Registrar::new(Arc::new(client));
        registrar.enroll(&context).await.unwrap();
    }

    #[tokio::test]
    async fn test_enroll_still_approves_after_registration_failure() {
        let mut client = MockColony::new();
        client
            .expect_add_runtime()
            .times(1)
            .returning(|_, _| Err(server_error(400, "runtime already exists")));
        client
            .expect_approve_runtime()
            .times(1)
            .returning(|_, _| Ok(()));

        let registrar = Registrar::new(Arc::new(client));
        let err = registrar.enroll(&context()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Registration(msg) if msg.contains("already exists")));
    }

    #[tokio::test]
    async fn test_approval_failure() {
        let mut client = MockColony::new();
        client
            .expect_add_runtime()
            .returning(|runtime, _| Ok(runtime.clone()));
        client.expect_approve_runtime().returning(|_, _| Err(refused()));

        let registrar = Registrar::new(Arc::new(client));
        let err = registrar.enroll(&context()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Approval(_)));
        assert!(!err.is_fatal());
    }

    fn persisted(id: &str) -> (TempDir, IdStore) {
        let dir = TempDir::new().unwrap();
        let store = IdStore::new(dir.path().join("runtimeid"));
        store.persist(id).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_deregister_persisted_id() {
        let (_dir, store) = persisted("abc123");
        let colony = Credential::generate().unwrap();
        let key = colony.public_key_hex();

        let mut client = MockColony::new();
        client
            .expect_delete_runtime()
            .withf(move |runtime_id, credential| {
                runtime_id == "abc123" && credential.public_key_hex() == key
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let registrar = Registrar::new(Arc::new(client));
        let id = registrar.deregister_persisted(&store, &colony).await.unwrap();
        assert_eq!(id, "abc123");
    }

    #[tokio::test]
    async fn test_deregister_failure_is_not_retried() {
        let (_dir, store) = persisted("abc123");

        let mut client = MockColony::new();
        client
            .expect_delete_runtime()
            .withf(|runtime_id, _| runtime_id == "abc123")
            .times(1)
            .returning(|_, _| Err(server_error(404, "runtime not found")));

        let registrar = Registrar::new(Arc::new(client));
        let err = registrar
            .deregister_persisted(&store, &Credential::generate().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Deregistration(msg) if msg.contains("not found")));
    }

    #[tokio::test]
    async fn test_missing_id_file_makes_no_call() {
        let dir = TempDir::new().unwrap();
        let store = IdStore::new(dir.path().join("absent"));

        let mut client = MockColony::new();
        client.expect_delete_runtime().never();

        let registrar = Registrar::new(Arc::new(client));
        let err = registrar
            .deregister_persisted(&store, &Credential::generate().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Persistence { .. }));
    }
}
