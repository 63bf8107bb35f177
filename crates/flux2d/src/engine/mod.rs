//! Pressure projection pipeline.
//!
//! Each component binds its kernels once at construction, records its
//! command lists once, and only submits them afterwards. [`World`] composes
//! the components into a full simulation step.

pub mod conjugate_gradient;
pub mod extrapolation;
pub mod incomplete_poisson;
pub mod jacobi;
pub mod level_set;
pub mod linear_solver;
pub(crate) mod params;
pub mod pressure;
pub mod reduce;
pub mod rigid_body;
pub mod velocity;
pub mod world;

pub use conjugate_gradient::ConjugateGradient;
pub use extrapolation::Extrapolation;
pub use incomplete_poisson::IncompletePoisson;
pub use jacobi::Jacobi;
pub use linear_solver::{Data, LinearSolver, Parameters};
pub use pressure::Pressure;
pub use rigid_body::{Forces, RigidBody, RigidBodyKind};
pub use velocity::Velocity;
pub use world::{RigidBodyId, World};
