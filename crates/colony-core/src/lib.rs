mod error;
mod identity;
mod process;
mod runtime;

pub use error::{Result, WorkerError};
pub use identity::{Credential, IdStore, WorkerIdentity, DEFAULT_ID_FILE};
pub use process::{Attribute, AttributeKind, TaskAssignment};
pub use runtime::{ResourceDescriptor, Runtime, WorkerProfile};
