use crate::{EdgeId, EntityId};
use std::fmt;
use thiserror::Error;

/// Rejected insertion or containment change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("Duplicate entity id: {0}")]
    DuplicateEntity(EntityId),
    #[error("Duplicate edge id: {0}")]
    DuplicateEdge(EdgeId),
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),
    #[error("Entity {0} is not a container")]
    NotAContainer(EntityId),
    #[error("Entity {0} cannot contain itself")]
    SelfContainment(EntityId),
    #[error("Assigning {child} to {container} would create a containment cycle")]
    Cycle {
        child: EntityId,
        container: EntityId,
    },
    #[error("Edge {edge} references missing endpoint {endpoint}")]
    MissingEndpoint { edge: EdgeId, endpoint: EntityId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    Missing,
    NonFinite,
    NonPositive,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "value is missing"),
            Self::NonFinite => write!(f, "value is not finite"),
            Self::NonPositive => write!(f, "value must be strictly positive"),
        }
    }
}

/// Malformed layout result entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid layout value {id}.{field}: {reason}")]
pub struct ValidationError {
    pub id: String,
    pub field: &'static str,
    pub reason: ValidationReason,
}

impl ValidationError {
    pub fn new(id: impl Into<String>, field: &'static str, reason: ValidationReason) -> Self {
        Self {
            id: id.into(),
            field,
            reason,
        }
    }
}

/// Structural invariant found broken by the audit pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("Container {0} is hidden but recorded as expanded")]
    ExpandedWhileHidden(EntityId),
    #[error("Entity {entity} is visible under collapsed ancestor {ancestor}")]
    VisibleUnderCollapsed {
        entity: EntityId,
        ancestor: EntityId,
    },
    #[error("Entity {0} is hidden without a collapsed ancestor")]
    HiddenWithoutCollapsedAncestor(EntityId),
    #[error("Edge {0} visibility does not match its endpoints")]
    EdgeVisibilityMismatch(EdgeId),
    #[error("Containment cycle through {0}")]
    Cycle(EntityId),
    #[error("Parent index disagrees with children of {0}")]
    ParentIndexMismatch(EntityId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("Entity not found: {0}")]
    Entity(EntityId),
    #[error("Edge not found: {0}")]
    Edge(EdgeId),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(String),
    #[error("{key} = {value} is outside {min}..={max}")]
    OutOfRange {
        key: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("Unrecognized option key: {0}")]
    InvalidKey(String),
}
