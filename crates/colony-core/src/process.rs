use serde::{Deserialize, Serialize};

/// Direction of an attribute relative to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    /// Task parameter supplied by the submitter
    In,
    /// Result published by the worker
    Out,
    /// Error detail published by the worker
    Err,
    /// Environment parameter supplied by the submitter
    Env,
}

impl AttributeKind {
    pub fn is_input(&self) -> bool {
        matches!(self, AttributeKind::In | AttributeKind::Env)
    }
}

/// Named key/value pair attached to an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "targetid")]
    pub target_id: String,

    #[serde(rename = "attributetype")]
    pub kind: AttributeKind,

    pub key: String,

    pub value: String,
}

impl Attribute {
    pub fn new(
        target_id: impl Into<String>,
        kind: AttributeKind,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Attribute {
            target_id: target_id.into(),
            kind,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Result attribute for the given assignment.
    pub fn outbound(
        target_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Attribute::new(target_id, AttributeKind::Out, key, value)
    }
}

/// One unit of work handed to this worker by the colony server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    #[serde(rename = "processid")]
    pub id: String,

    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl TaskAssignment {
    pub fn new(id: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        TaskAssignment {
            id: id.into(),
            attributes,
        }
    }

    /// Inbound attributes in the order the server sent them.
    pub fn inputs(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.kind.is_input())
    }

    pub fn input(&self, key: &str) -> Option<&Attribute> {
        self.inputs().find(|a| a.key == key)
    }
}
