use thiserror::Error;

/// Errors reported by the expression algebra and the simplex solver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// A required constraint cannot be satisfied together with the others.
    #[error("A required constraint cannot be satisfied")]
    RequiredFailure,
    /// The combination is not a linear expression (e.g. variable * variable).
    #[error("The resulting expression would be nonlinear")]
    NonExpression,
    /// The solver declined to finish, e.g. the pivot limit was reached.
    #[error("The constraints are too difficult to solve")]
    TooDifficult,
    /// Tried to remove a constraint that was never added.
    #[error("Tried to remove a constraint never added to the tableau")]
    ConstraintNotFound,
    /// Some variable in the tableau is not pinned by a stay or edit constraint.
    #[error("There are not enough stays to give specific values to every variable")]
    NotEnoughStays,
    #[error("suggest_value for variable {0}, but it is not an edit variable")]
    UnknownEditVariable(String),
    #[error("Variable {0} is already an edit variable")]
    DuplicateEditVariable(String),
    #[error("No edit variables have been added")]
    NoEditVariables,
    /// Invariant violation. Always a bug in the solver.
    #[error("Internal solver error: {0}")]
    Internal(&'static str),
}

impl SolverError {
    /// Returns a stable code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            SolverError::RequiredFailure => "REQUIRED_FAILURE",
            SolverError::NonExpression => "NON_EXPRESSION",
            SolverError::TooDifficult => "TOO_DIFFICULT",
            SolverError::ConstraintNotFound => "CONSTRAINT_NOT_FOUND",
            SolverError::NotEnoughStays => "NOT_ENOUGH_STAYS",
            SolverError::UnknownEditVariable(_) => "EDIT_VARIABLE_UNKNOWN",
            SolverError::DuplicateEditVariable(_) => "EDIT_VARIABLE_DUPLICATE",
            SolverError::NoEditVariables => "EDIT_VARIABLES_EMPTY",
            SolverError::Internal(_) => "INTERNAL",
        }
    }
}
