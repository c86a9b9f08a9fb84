//! Linear static plane stress finite element models built from 3-node
//! triangles.
//!
//! [`Model`] owns the mesh and solves it with [`Model::step`]. [`Session`]
//! exposes models to callers that can only hold opaque handles.

pub mod datatypes;
pub mod error;
pub mod handle;
pub mod input;
pub mod model;
pub mod post_processor;
pub mod session;
pub mod solver;

pub use datatypes::{Element, KnownType, Material, Node, Stress, Vertex};
pub use error::{HematiteError, Result, SingularCause};
pub use handle::{Arena, Guarded, Handle};
pub use model::Model;
pub use session::{ModelHandle, NodeHandle, Session};
pub use solver::{SolverConfig, SolverMethod};
