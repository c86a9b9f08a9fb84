use thiserror::Error;

pub type Result<T> = std::result::Result<T, HematiteError>;

#[derive(Debug, Error)]
pub enum HematiteError {
    #[error("index {index} is out of range for length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("an element needs at least 3 nodes, model has {nodes}")]
    InsufficientNodes { nodes: usize },

    #[error("node index {node} does not exist, model has {nodes} nodes")]
    InvalidReference { node: usize, nodes: usize },

    #[error("singular system: {0}")]
    SingularSystem(SingularCause),

    #[error("iterative solver failed: {0}")]
    Solver(String),

    #[error("handle was used after it was released")]
    UseAfterFree,

    #[error("handle belongs to a different owner")]
    ForeignHandle,

    #[error("input error: {0}")]
    Input(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a solve could not produce a unique result
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SingularCause {
    #[error("model has no elements")]
    NoElements,

    #[error("element {element} has no area")]
    DegenerateElement { element: usize },

    #[error("node {node} has a force-known axis but is not part of an element")]
    UnconnectedNode { node: usize },

    #[error("stiffness factorization pivot {pivot:e} is below tolerance")]
    IllConditioned { pivot: f64 },

    #[error("iterative solve stopped at relative residual {residual:e}")]
    NotConverged { residual: f64 },

    #[error("solution contains non-finite values")]
    NonFinite,
}

impl From<SingularCause> for HematiteError {
    fn from(cause: SingularCause) -> Self {
        HematiteError::SingularSystem(cause)
    }
}
