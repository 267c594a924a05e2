//! Sparse simplex tableau.
//!
//! `rows` maps each basic variable to its defining expression over non-basic
//! variables. `columns` is the exact transpose of the row terms: for every
//! non-basic variable, the set of basic variables whose row mentions it.
//! Rows are owned here and only mutated through the primitives below, which
//! keep both indices and the infeasibility set consistent.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexSet;

use crate::error::SolverError;
use crate::expression::{Expression, TermListener};
use crate::variable::Variable;

/// Transpose of the row terms plus the external non-basic variables.
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnIndex {
    columns: BTreeMap<Variable, BTreeSet<Variable>>,
    external_parametric: BTreeSet<Variable>,
}

impl ColumnIndex {
    fn insert(&mut self, var: Variable, subject: Variable) {
        self.columns.entry(var).or_default().insert(subject);
        if var.is_external() {
            self.external_parametric.insert(var);
        }
    }

    fn remove(&mut self, var: Variable, subject: Variable) {
        if let Some(set) = self.columns.get_mut(&var) {
            set.remove(&subject);
            if set.is_empty() {
                self.columns.remove(&var);
                self.external_parametric.remove(&var);
            }
        }
    }

    pub fn get(&self, var: Variable) -> Option<&BTreeSet<Variable>> {
        self.columns.get(&var)
    }

    pub fn contains(&self, var: Variable) -> bool {
        self.columns.contains_key(&var)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }
}

impl TermListener for ColumnIndex {
    fn note_added_variable(&mut self, var: Variable, subject: Variable) {
        self.insert(var, subject);
    }

    fn note_removed_variable(&mut self, var: Variable, subject: Variable) {
        self.remove(var, subject);
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Tableau {
    rows: BTreeMap<Variable, Expression>,
    columns: ColumnIndex,
    infeasible_rows: IndexSet<Variable>,
    external_rows: BTreeSet<Variable>,
}

impl Tableau {
    pub fn row(&self, basic: Variable) -> Option<&Expression> {
        self.rows.get(&basic)
    }

    pub fn row_mut(&mut self, basic: Variable) -> Option<&mut Expression> {
        self.rows.get_mut(&basic)
    }

    pub fn is_basic(&self, var: Variable) -> bool {
        self.rows.contains_key(&var)
    }

    pub fn column(&self, var: Variable) -> Option<&BTreeSet<Variable>> {
        self.columns.get(var)
    }

    pub fn columns_has_key(&self, var: Variable) -> bool {
        self.columns.contains(var)
    }

    /// True when `var` is a row key or appears in some row.
    pub fn contains(&self, var: Variable) -> bool {
        self.is_basic(var) || self.columns_has_key(var)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn external_rows(&self) -> &BTreeSet<Variable> {
        &self.external_rows
    }

    pub fn external_parametric_vars(&self) -> &BTreeSet<Variable> {
        &self.columns.external_parametric
    }

    pub fn infeasible_count(&self) -> usize {
        self.infeasible_rows.len()
    }

    pub fn mark_infeasible(&mut self, basic: Variable) {
        self.infeasible_rows.insert(basic);
    }

    /// Oldest infeasible row first.
    pub fn pop_infeasible(&mut self) -> Option<Variable> {
        self.infeasible_rows.shift_remove_index(0)
    }

    pub fn clear_infeasible(&mut self) {
        self.infeasible_rows.clear();
    }

    pub fn add_row(&mut self, basic: Variable, expr: Expression) {
        for (var, _) in expr.terms() {
            self.columns.insert(var, basic);
        }
        if basic.is_external() {
            self.external_rows.insert(basic);
        }
        self.rows.insert(basic, expr);
    }

    pub fn remove_row(&mut self, basic: Variable) -> Result<Expression, SolverError> {
        let expr = self
            .rows
            .remove(&basic)
            .ok_or(SolverError::Internal("remove_row on a non-basic variable"))?;
        for (var, _) in expr.terms() {
            self.columns.remove(var, basic);
        }
        self.infeasible_rows.shift_remove(&basic);
        if basic.is_external() {
            self.external_rows.remove(&basic);
        }
        Ok(expr)
    }

    /// Drop `var` from every row that mentions it.
    pub fn remove_column(&mut self, var: Variable) {
        if let Some(basics) = self.columns.columns.remove(&var) {
            for basic in basics {
                if let Some(row) = self.rows.get_mut(&basic) {
                    row.remove_variable(var);
                }
            }
        }
        if var.is_external() {
            self.external_rows.remove(&var);
            self.columns.external_parametric.remove(&var);
        }
    }

    /// Replace every occurrence of `old` by `expr`. Restricted rows whose
    /// constant turns negative are marked infeasible.
    pub fn substitute_out(&mut self, old: Variable, expr: &Expression) -> Result<(), SolverError> {
        let basics = self.columns.columns.remove(&old).unwrap_or_default();
        for basic in basics {
            let row = self
                .rows
                .get_mut(&basic)
                .ok_or(SolverError::Internal("column index names a missing row"))?;
            row.substitute_out(old, expr, basic, &mut self.columns);
            if basic.is_restricted() && row.constant() < 0.0 {
                self.infeasible_rows.insert(basic);
            }
        }
        if old.is_external() {
            self.external_rows.insert(old);
            self.columns.external_parametric.remove(&old);
        }
        Ok(())
    }

    /// `row(subject) += multiplier * var`, keeping the column index current.
    pub fn add_variable_to_row(
        &mut self,
        subject: Variable,
        var: Variable,
        multiplier: f64,
    ) -> Result<(), SolverError> {
        let row = self
            .rows
            .get_mut(&subject)
            .ok_or(SolverError::Internal("missing row in add_variable_to_row"))?;
        row.add_variable_noting(var, multiplier, subject, &mut self.columns);
        Ok(())
    }

    /// `row(subject) += multiplier * expr`, keeping the column index current.
    pub fn add_expression_to_row(
        &mut self,
        subject: Variable,
        expr: &Expression,
        multiplier: f64,
    ) -> Result<(), SolverError> {
        let row = self
            .rows
            .get_mut(&subject)
            .ok_or(SolverError::Internal("missing row in add_expression_to_row"))?;
        row.add_expression_noting(expr, multiplier, subject, &mut self.columns);
        Ok(())
    }

    /// Set a term of `row(subject)` outright. `var` must not be in that row.
    pub fn set_row_variable(
        &mut self,
        subject: Variable,
        var: Variable,
        coefficient: f64,
    ) -> Result<(), SolverError> {
        let row = self
            .rows
            .get_mut(&subject)
            .ok_or(SolverError::Internal("missing row in set_row_variable"))?;
        row.set_variable(var, coefficient);
        self.columns.insert(var, subject);
        Ok(())
    }

    /// Shift the constant of every row mentioning `var` by
    /// `coefficient(var) * delta`.
    pub fn shift_column_constants(&mut self, var: Variable, delta: f64) -> Result<(), SolverError> {
        let basics = self
            .columns
            .get(var)
            .ok_or(SolverError::Internal("edit minus variable has no column"))?;
        for basic in basics {
            let row = self
                .rows
                .get_mut(basic)
                .ok_or(SolverError::Internal("column index names a missing row"))?;
            let coeff = row.coefficient_for(var);
            row.increment_constant(coeff * delta);
            if basic.is_restricted() && row.constant() < 0.0 {
                self.infeasible_rows.insert(*basic);
            }
        }
        Ok(())
    }

    /// Check the row/column transpose invariant. Used by tests.
    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        let mut expected: BTreeMap<Variable, BTreeSet<Variable>> = BTreeMap::new();
        for (&basic, row) in &self.rows {
            for (var, _) in row.terms() {
                if self.rows.contains_key(&var) {
                    return false;
                }
                expected.entry(var).or_default().insert(basic);
            }
        }
        expected == self.columns.columns
    }
}
