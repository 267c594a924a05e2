/// Tuning knobs for a [`SimplexSolver`](crate::SimplexSolver).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Re-optimize and push values after every add/remove.
    pub auto_solve: bool,
    /// Pivot limit for a single optimize or dual optimize run.
    pub max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            auto_solve: true,
            max_iterations: 10_000,
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_solve(mut self, auto_solve: bool) -> Self {
        self.auto_solve = auto_solve;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}
