//! Entry paths: provision and enroll, or deregister.

use crate::config::{DeregisterConfig, WorkerConfig};
use crate::context::WorkerContext;
use crate::executor::TaskExecutor;
use crate::handler::{FibonacciHandler, HandlerRegistry};
use crate::registration::Registrar;
use crate::worker::Worker;
use colony_client::ColonyClient;
use colony_core::{IdStore, Result, WorkerIdentity};
use std::sync::Arc;
use tracing::{info, warn};

/// Create a fresh identity and persist its id before anything touches the
/// network.
pub fn provision_identity(store: &IdStore) -> Result<WorkerIdentity> {
    let identity = WorkerIdentity::generate()?;
    store.persist(identity.id())?;
    info!("Runtime id {} saved to {}", identity.id(), store.path().display());
    Ok(identity)
}

/// Handlers selected by configuration.
pub fn handlers(config: &WorkerConfig) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    handlers.register(
        FibonacciHandler::new(config.fib_method, config.result_format)
            .with_max_n(config.fib_max_n),
    );
    handlers
}

/// Provision, enroll and build the worker. The returned worker has not
/// started polling.
pub async fn start(config: &WorkerConfig, client: Arc<dyn ColonyClient>) -> Result<Worker> {
    let identity = provision_identity(&IdStore::new(&config.id_file))?;
    let context = WorkerContext::new(
        identity,
        &config.colony_id,
        config.colony_credential.clone(),
        config.profile.clone(),
    );

    let registrar = Registrar::new(client.clone());
    if let Err(e) = registrar.enroll(&context).await {
        if config.require_registration {
            return Err(e);
        }
        warn!("Continuing without confirmed registration, polls may be rejected");
    }

    let executor = TaskExecutor::new(handlers(config))
        .with_timeout(config.task_timeout)
        .with_delay(config.delay);

    Ok(Worker::new(client, context, executor)
        .with_retry(config.retry.clone())
        .with_unrecognized_policy(config.unrecognized))
}

/// Delete the runtime recorded by an earlier run. Returns the removed id.
pub async fn deregister(
    config: &DeregisterConfig,
    client: Arc<dyn ColonyClient>,
) -> Result<String> {
    let store = IdStore::new(&config.id_file);
    Registrar::new(client)
        .deregister_persisted(&store, &config.colony_credential)
        .await
}
