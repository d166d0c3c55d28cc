use serde::{Deserialize, Serialize};

/// Hardware the worker advertises to the colony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub cpu: String,
    pub cores: u32,
    pub memory: u64,
    pub gpu: String,
    pub gpus: u32,
}

/// What kind of work this worker performs and on what hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerProfile {
    pub runtime_type: String,
    pub name: String,
    pub resources: ResourceDescriptor,
}

/// A profile bound to a runtime id and a colony, as submitted to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    #[serde(rename = "runtimeid")]
    pub id: String,

    #[serde(rename = "runtimetype")]
    pub runtime_type: String,

    pub name: String,

    #[serde(rename = "colonyid")]
    pub colony_id: String,

    pub cpu: String,
    pub cores: u32,
    pub mem: u64,
    pub gpu: String,
    pub gpus: u32,
}

impl Runtime {
    pub fn new(
        id: impl Into<String>,
        colony_id: impl Into<String>,
        profile: &WorkerProfile,
    ) -> Self {
        let resources = &profile.resources;
        Runtime {
            id: id.into(),
            runtime_type: profile.runtime_type.clone(),
            name: profile.name.clone(),
            colony_id: colony_id.into(),
            cpu: resources.cpu.clone(),
            cores: resources.cores,
            mem: resources.memory,
            gpu: resources.gpu.clone(),
            gpus: resources.gpus,
        }
    }
}
