use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use trellis_core::{EntityId, LayoutConfig, StyleConfig};
use trellis_graph::ToggleAction;

use crate::error::OperationError;

/// Monotonic id assigned at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request to change the model, executed strictly one at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Expand(EntityId),
    Collapse(EntityId),
    Toggle(EntityId),
    ExpandAll,
    CollapseAll,
    /// Applied in order with a single layout and render pass.
    Batch(Vec<(EntityId, ToggleAction)>),
    Search(String),
    ClearSearch,
    /// Open the ancestors of an entity so it becomes visible.
    Reveal(EntityId),
    /// Reveal the search result at the given rank.
    RevealMatch(usize),
    UpdateLayoutConfig(LayoutConfig),
    UpdateStyle(StyleConfig),
    Relayout,
}

/// Queue grouping. A newly queued operation of a coalescable class replaces
/// every queued operation of the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Toggle,
    Bulk,
    Search,
    LayoutConfig,
    Style,
    Relayout,
}

impl OperationClass {
    pub fn is_coalescable(self) -> bool {
        matches!(
            self,
            Self::Search | Self::LayoutConfig | Self::Style | Self::Relayout
        )
    }
}

impl Operation {
    pub fn class(&self) -> OperationClass {
        match self {
            Self::Expand(_) | Self::Collapse(_) | Self::Toggle(_) => OperationClass::Toggle,
            Self::Reveal(_) | Self::RevealMatch(_) => OperationClass::Toggle,
            Self::ExpandAll | Self::CollapseAll | Self::Batch(_) => OperationClass::Bulk,
            Self::Search(_) | Self::ClearSearch => OperationClass::Search,
            Self::UpdateLayoutConfig(_) => OperationClass::LayoutConfig,
            Self::UpdateStyle(_) => OperationClass::Style,
            Self::Relayout => OperationClass::Relayout,
        }
    }

    /// Whether a successful mutation needs a layout pass before rendering.
    pub fn affects_layout(&self) -> bool {
        !matches!(
            self,
            Self::Search(_) | Self::ClearSearch | Self::UpdateStyle(_)
        )
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expand(id) => write!(f, "expand({id})"),
            Self::Collapse(id) => write!(f, "collapse({id})"),
            Self::Toggle(id) => write!(f, "toggle({id})"),
            Self::ExpandAll => write!(f, "expand_all"),
            Self::CollapseAll => write!(f, "collapse_all"),
            Self::Batch(actions) => write!(f, "batch({})", actions.len()),
            Self::Search(query) => write!(f, "search({query:?})"),
            Self::ClearSearch => write!(f, "clear_search"),
            Self::Reveal(id) => write!(f, "reveal({id})"),
            Self::RevealMatch(index) => write!(f, "reveal_match({index})"),
            Self::UpdateLayoutConfig(_) => write!(f, "update_layout_config"),
            Self::UpdateStyle(_) => write!(f, "update_style"),
            Self::Relayout => write!(f, "relayout"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseOperationError {
    #[error("Unknown operation: {0}")]
    UnknownVerb(String),
    #[error("Operation '{0}' requires an argument")]
    MissingArgument(String),
    #[error("Invalid argument for '{verb}': {value}")]
    InvalidArgument { verb: String, value: String },
}

/// Parses the compact `verb[:argument]` form used on the command line,
/// e.g. `collapse:pkg`, `search:render`, `expand-all`.
impl FromStr for Operation {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (verb, arg) = match s.split_once(':') {
            Some((verb, arg)) => (verb.trim(), Some(arg)),
            None => (s.trim(), None),
        };
        let required = || {
            arg.filter(|a| !a.trim().is_empty())
                .map(|a| a.trim().to_string())
                .ok_or_else(|| ParseOperationError::MissingArgument(verb.to_string()))
        };

        match verb {
            "expand" => Ok(Self::Expand(EntityId::new(required()?))),
            "collapse" => Ok(Self::Collapse(EntityId::new(required()?))),
            "toggle" => Ok(Self::Toggle(EntityId::new(required()?))),
            "reveal" => Ok(Self::Reveal(EntityId::new(required()?))),
            "expand-all" => Ok(Self::ExpandAll),
            "collapse-all" => Ok(Self::CollapseAll),
            "clear-search" => Ok(Self::ClearSearch),
            "relayout" => Ok(Self::Relayout),
            // Queries keep their surrounding whitespace.
            "search" => Ok(Self::Search(arg.unwrap_or_default().to_string())),
            "reveal-match" => {
                let value = required()?;
                value
                    .parse()
                    .map(Self::RevealMatch)
                    .map_err(|_| ParseOperationError::InvalidArgument {
                        verb: verb.to_string(),
                        value,
                    })
            }
            other => Err(ParseOperationError::UnknownVerb(other.to_string())),
        }
    }
}

/// Final state of a queued operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// The model changed, or a relayout ran. `frame_id` is the frame handed
    /// to the renderer.
    Completed {
        layout: bool,
        frame_id: Option<u64>,
    },
    /// Target state was already reached. No layout or render pass ran.
    NoOp,
    Failed(OperationError),
    Superseded {
        by: OperationId,
    },
    Cancelled,
}

impl OperationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn frame_id(&self) -> Option<u64> {
        match self {
            Self::Completed { frame_id, .. } => *frame_id,
            _ => None,
        }
    }
}
