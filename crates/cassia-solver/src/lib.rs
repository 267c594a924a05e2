mod config;
mod constraint;
mod edit;
mod error;
mod expression;
mod solver;
mod strength;
mod tableau;
mod variable;

#[cfg(feature = "serde")]
mod snapshot;

pub use config::SolverConfig;
pub use constraint::{Constraint, ConstraintKind, Operand, Relation};
pub use error::SolverError;
pub use expression::{EPSILON, Expression, approx};
pub use solver::{ConstraintId, SimplexSolver};
pub use strength::{Strength, SymbolicWeight};
pub use variable::{Point, Variable, VariableKind};

#[cfg(feature = "serde")]
pub use snapshot::{
    ConstraintRecord, ExpressionRecord, SnapshotError, SystemSnapshot, TermRecord, VariableRecord,
};
