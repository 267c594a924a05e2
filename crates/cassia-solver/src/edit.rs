//! Edit-variable bookkeeping.

use crate::solver::ConstraintId;
use crate::variable::Variable;

/// Per edit-variable state, kept from `add_edit_var` until the variable is
/// removed again by `end_edit` or `remove_edit_vars_to`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EditInfo {
    pub constraint: ConstraintId,
    pub edit_plus: Variable,
    pub edit_minus: Variable,
    pub prev_edit_constant: f64,
    pub index: usize,
}

/// Stack of edit-variable counts, one entry per open edit session. The
/// bottom entry is always 0.
#[derive(Debug, Clone)]
pub(crate) struct EditStack {
    checkpoints: Vec<usize>,
}

impl Default for EditStack {
    fn default() -> Self {
        Self { checkpoints: vec![0] }
    }
}

impl EditStack {
    pub fn push(&mut self, count: usize) {
        self.checkpoints.push(count);
    }

    /// Close the innermost session and return the count to roll back to.
    pub fn pop(&mut self) -> usize {
        if self.checkpoints.len() > 1 {
            self.checkpoints.pop();
        }
        self.current()
    }

    pub fn current(&self) -> usize {
        self.checkpoints.last().copied().unwrap_or(0)
    }

    pub fn depth(&self) -> usize {
        self.checkpoints.len() - 1
    }
}
