use colony_core::{Credential, Runtime, WorkerIdentity, WorkerProfile};

/// Immutable state shared by registration, the loop and result reporting.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    identity: WorkerIdentity,
    colony_id: String,
    colony_credential: Credential,
    profile: WorkerProfile,
}

impl WorkerContext {
    pub fn new(
        identity: WorkerIdentity,
        colony_id: impl Into<String>,
        colony_credential: Credential,
        profile: WorkerProfile,
    ) -> Self {
        WorkerContext {
            identity,
            colony_id: colony_id.into(),
            colony_credential,
            profile,
        }
    }

    pub fn runtime_id(&self) -> &str {
        self.identity.id()
    }

    /// Key for operations the worker performs as itself.
    pub fn credential(&self) -> &Credential {
        self.identity.credential()
    }

    pub fn colony_id(&self) -> &str {
        &self.colony_id
    }

    /// Colony owner key, used only to add and approve the runtime.
    pub fn colony_credential(&self) -> &Credential {
        &self.colony_credential
    }

    pub fn profile(&self) -> &WorkerProfile {
        &self.profile
    }

    /// Registration record describing this worker.
    pub fn runtime(&self) -> Runtime {
        Runtime::new(self.runtime_id(), &self.colony_id, &self.profile)
    }
}
