//! Incremental simplex solver.
//!
//! Every constraint becomes one tableau row, expressed purely over
//! non-basic variables. Required equalities get a dummy marker, inequalities
//! a slack marker, and non-required constraints error variables that are
//! weighted into the objective row. Edits only touch row constants and are
//! repaired with the dual simplex, so an edit session never re-runs phase 1.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::config::SolverConfig;
use crate::constraint::{Constraint, ConstraintKind};
use crate::edit::{EditInfo, EditStack};
use crate::error::SolverError;
use crate::expression::{EPSILON, Expression, approx, near_zero};
use crate::strength::Strength;
use crate::tableau::Tableau;
use crate::variable::{IdGenerator, Point, Variable, VariableKind};

/// Handle returned by `add_constraint`, used to remove the constraint again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(u64);

impl ConstraintId {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

type ChangeCallback = Box<dyn FnMut(&BTreeMap<Variable, f64>) + Send>;

#[derive(Debug, Clone)]
struct External {
    name: String,
    value: f64,
}

/// Row produced from a constraint, before a subject is chosen for it.
struct NewRow {
    expression: Expression,
    marker: Variable,
    error_vars: Vec<Variable>,
    edit_vars: Option<(Variable, Variable)>,
}

pub struct SimplexSolver {
    config: SolverConfig,
    ids: IdGenerator,
    tableau: Tableau,
    objective: Variable,
    externals: BTreeMap<Variable, External>,
    constraints: BTreeMap<ConstraintId, Constraint>,
    next_constraint: u64,
    marker_vars: BTreeMap<ConstraintId, Variable>,
    error_vars: BTreeMap<ConstraintId, Vec<Variable>>,
    stay_plus_error_vars: Vec<Variable>,
    stay_minus_error_vars: Vec<Variable>,
    edit_vars: IndexMap<Variable, EditInfo>,
    edit_stack: EditStack,
    needs_solving: bool,
    /// Value each variable had at the previous `solve`, for variables pushed
    /// since then.
    solve_baseline: BTreeMap<Variable, f64>,
    callbacks: Vec<ChangeCallback>,
    optimize_count: usize,
}

impl Default for SimplexSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimplexSolver {
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    pub fn with_config(config: SolverConfig) -> Self {
        let mut ids = IdGenerator::default();
        let objective = ids.next(VariableKind::Objective);
        let mut tableau = Tableau::default();
        tableau.add_row(objective, Expression::new());
        Self {
            config,
            ids,
            tableau,
            objective,
            externals: BTreeMap::new(),
            constraints: BTreeMap::new(),
            next_constraint: 1,
            marker_vars: BTreeMap::new(),
            error_vars: BTreeMap::new(),
            stay_plus_error_vars: Vec::new(),
            stay_minus_error_vars: Vec::new(),
            edit_vars: IndexMap::new(),
            edit_stack: EditStack::default(),
            needs_solving: false,
            solve_baseline: BTreeMap::new(),
            callbacks: Vec::new(),
            optimize_count: 0,
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_auto_solve(&mut self, auto_solve: bool) {
        self.config.auto_solve = auto_solve;
    }

    // ── Variables ──

    pub fn create_variable(&mut self, name: impl Into<String>, value: f64) -> Variable {
        let var = self.ids.next(VariableKind::External);
        self.externals.insert(
            var,
            External {
                name: name.into(),
                value,
            },
        );
        var
    }

    /// A variable named after its id, e.g. `v7`.
    pub fn create_anonymous_variable(&mut self, value: f64) -> Variable {
        let var = self.ids.next(VariableKind::External);
        self.externals.insert(
            var,
            External {
                name: var.to_string(),
                value,
            },
        );
        var
    }

    pub fn create_point(&mut self, x: f64, y: f64) -> Point {
        Point {
            x: self.create_anonymous_variable(x),
            y: self.create_anonymous_variable(y),
        }
    }

    /// Current value of an external variable, 0 for unknown variables.
    pub fn value(&self, var: Variable) -> f64 {
        self.externals.get(&var).map_or(0.0, |ext| ext.value)
    }

    pub fn name(&self, var: Variable) -> Option<&str> {
        self.externals.get(&var).map(|ext| ext.name.as_str())
    }

    fn display_name(&self, var: Variable) -> String {
        self.name(var).map_or_else(|| var.to_string(), str::to_string)
    }

    /// All external variables in creation order.
    pub fn variables(&self) -> impl Iterator<Item = (Variable, &str, f64)> + '_ {
        self.externals
            .iter()
            .map(|(&var, ext)| (var, ext.name.as_str(), ext.value))
    }

    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintId, &Constraint)> + '_ {
        self.constraints.iter().map(|(&id, c)| (id, c))
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(&id)
    }

    /// True when `var` is a row key or appears in some row.
    pub fn contains_variable(&self, var: Variable) -> bool {
        self.tableau.contains(var)
    }

    pub fn edit_variable_count(&self) -> usize {
        self.edit_vars.len()
    }

    /// Register an observer called with the changed variables after every
    /// value push.
    pub fn on_change(&mut self, callback: impl FnMut(&BTreeMap<Variable, f64>) + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    // ── Constraints ──

    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId, SolverError> {
        if let ConstraintKind::Edit(var) = constraint.kind() {
            if self.edit_vars.contains_key(&var) {
                return Err(SolverError::DuplicateEditVariable(self.display_name(var)));
            }
        }

        let row = self.new_expression(&constraint)?;
        let error_vars = row.error_vars.clone();
        if let Err(err) = self.insert_row(row.expression) {
            // error variables only live in the objective row at this point
            for &var in &error_vars {
                self.tableau.remove_column(var);
            }
            warn!(
                component = "solver",
                operation = "add_constraint",
                status = "rollback",
                error_code = err.code(),
                constraint = %constraint,
                "Rejected constraint, tableau restored"
            );
            return Err(err);
        }

        let id = ConstraintId(self.next_constraint);
        self.next_constraint += 1;
        self.marker_vars.insert(id, row.marker);
        if !error_vars.is_empty() {
            self.error_vars.insert(id, error_vars);
        }
        match (constraint.kind(), row.edit_vars) {
            (ConstraintKind::Stay(_), Some((plus, minus))) => {
                self.stay_plus_error_vars.push(plus);
                self.stay_minus_error_vars.push(minus);
            }
            (ConstraintKind::Edit(var), Some((plus, minus))) => {
                let index = self.edit_vars.len();
                self.edit_vars.insert(
                    var,
                    EditInfo {
                        constraint: id,
                        edit_plus: plus,
                        edit_minus: minus,
                        prev_edit_constant: constraint.expression().constant(),
                        index,
                    },
                );
            }
            _ => {}
        }

        debug!(
            component = "solver",
            operation = "add_constraint",
            status = "success",
            constraint_id = %id,
            constraint = %constraint,
            rows = self.tableau.row_count(),
            "Added constraint"
        );
        self.constraints.insert(id, constraint);
        self.needs_solving = true;

        if self.config.auto_solve {
            if let Err(err) = self.optimize(self.objective) {
                // values were not pushed yet, so detaching restores the
                // caller-visible state
                self.detach_constraint(id)?;
                warn!(
                    component = "solver",
                    operation = "add_constraint",
                    status = "rollback",
                    error_code = err.code(),
                    constraint_id = %id,
                    "Re-optimize failed, constraint detached"
                );
                return Err(err);
            }
            self.set_external_variables();
        }
        Ok(id)
    }

    /// `add_constraint` that reports failure as `false`.
    pub fn try_add_constraint(&mut self, constraint: Constraint) -> bool {
        self.add_constraint(constraint).is_ok()
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<(), SolverError> {
        self.detach_constraint(id)?;
        if self.config.auto_solve {
            self.optimize(self.objective)?;
            self.set_external_variables();
        }
        Ok(())
    }

    /// Take a constraint out of the tableau without re-optimizing. The
    /// tableau stays feasible; `needs_solving` is left set.
    fn detach_constraint(&mut self, id: ConstraintId) -> Result<(), SolverError> {
        let constraint = self
            .constraints
            .remove(&id)
            .ok_or(SolverError::ConstraintNotFound)?;
        self.needs_solving = true;
        self.reset_stay_constants();

        let weight = constraint.objective_weight();
        let error_vars = self.error_vars.remove(&id).unwrap_or_default();
        for &var in &error_vars {
            match self.tableau.row(var).cloned() {
                Some(row) => self
                    .tableau
                    .add_expression_to_row(self.objective, &row, -weight)?,
                None => self.tableau.add_variable_to_row(self.objective, var, -weight)?,
            }
        }

        let marker = self
            .marker_vars
            .remove(&id)
            .ok_or(SolverError::Internal("constraint has no marker variable"))?;
        if !self.tableau.is_basic(marker) {
            match self.marker_exit(marker)? {
                Some(exit) => self.pivot(marker, exit)?,
                None => self.tableau.remove_column(marker),
            }
        }
        if self.tableau.is_basic(marker) {
            self.tableau.remove_row(marker)?;
        }

        for &var in error_vars.iter().filter(|&&var| var != marker) {
            if self.tableau.is_basic(var) {
                self.tableau.remove_row(var)?;
            } else {
                self.tableau.remove_column(var);
            }
        }

        match constraint.kind() {
            ConstraintKind::Stay(_) => self.forget_stay_error_vars(&error_vars),
            ConstraintKind::Edit(var) => {
                if let Some(info) = self.edit_vars.shift_remove(&var) {
                    self.tableau.remove_column(info.edit_minus);
                }
                for (index, info) in self.edit_vars.values_mut().enumerate() {
                    info.index = index;
                }
            }
            ConstraintKind::Equation | ConstraintKind::Inequality => {}
        }

        debug!(
            component = "solver",
            operation = "remove_constraint",
            status = "success",
            constraint_id = %id,
            marker = %marker,
            rows = self.tableau.row_count(),
            "Removed constraint"
        );
        Ok(())
    }

    fn forget_stay_error_vars(&mut self, error_vars: &[Variable]) {
        let mut index = 0;
        while index < self.stay_plus_error_vars.len() {
            if error_vars.contains(&self.stay_plus_error_vars[index]) {
                self.stay_plus_error_vars.remove(index);
                self.stay_minus_error_vars.remove(index);
            } else {
                index += 1;
            }
        }
    }

    /// Pin `var` to its current value.
    pub fn add_stay(
        &mut self,
        var: Variable,
        strength: Strength,
        weight: f64,
    ) -> Result<ConstraintId, SolverError> {
        let value = self.value(var);
        self.add_constraint(
            Constraint::stay(var, value)
                .with_strength(strength)
                .with_weight(weight),
        )
    }

    /// Weak stays on every point, weight doubling with the index.
    pub fn add_point_stays(&mut self, points: &[Point]) -> Result<(), SolverError> {
        let mut weight = 1.0;
        for point in points {
            self.add_stay(point.x, Strength::WEAK, weight)?;
            self.add_stay(point.y, Strength::WEAK, weight)?;
            weight *= 2.0;
        }
        Ok(())
    }

    /// Add a weak stay on `var` unless it is already part of the tableau.
    pub fn add_var(&mut self, var: Variable) -> Result<(), SolverError> {
        if !self.tableau.contains(var) {
            self.add_stay(var, Strength::WEAK, 1.0)?;
            trace!(
                component = "solver",
                operation = "add_var",
                variable = %var,
                "Added initial stay"
            );
        }
        Ok(())
    }

    /// Fails when an external variable in the tableau is parametric and
    /// nothing (stay or edit) pins its value.
    pub fn ensure_stays(&self) -> Result<(), SolverError> {
        for &var in self.tableau.external_parametric_vars() {
            let pinned = self
                .constraints
                .values()
                .any(|constraint| constraint.variable() == Some(var));
            if !pinned {
                return Err(SolverError::NotEnoughStays);
            }
        }
        Ok(())
    }

    // ── Edit sessions ──

    pub fn add_edit_var(
        &mut self,
        var: Variable,
        strength: Strength,
        weight: f64,
    ) -> Result<ConstraintId, SolverError> {
        if self.edit_vars.contains_key(&var) {
            return Err(SolverError::DuplicateEditVariable(self.display_name(var)));
        }
        let value = self.value(var);
        self.add_constraint(
            Constraint::edit(var, value)
                .with_strength(strength)
                .with_weight(weight),
        )
    }

    pub fn begin_edit(&mut self) -> Result<(), SolverError> {
        if self.edit_vars.is_empty() {
            return Err(SolverError::NoEditVariables);
        }
        self.tableau.clear_infeasible();
        self.reset_stay_constants();
        self.edit_stack.push(self.edit_vars.len());
        debug!(
            component = "solver",
            operation = "begin_edit",
            depth = self.edit_stack.depth(),
            edit_vars = self.edit_vars.len(),
            "Began edit session"
        );
        Ok(())
    }

    /// Resolve and drop the edit variables of the innermost session. After
    /// the outermost session the resolved values stay visible until the next
    /// `solve`.
    pub fn end_edit(&mut self) -> Result<(), SolverError> {
        if self.edit_vars.is_empty() {
            return Err(SolverError::NoEditVariables);
        }
        self.resolve()?;
        let keep = self.edit_stack.pop();
        // closing the outermost session keeps the resolved values until the
        // next solve
        self.truncate_edit_vars(keep, keep > 0)?;
        debug!(
            component = "solver",
            operation = "end_edit",
            depth = self.edit_stack.depth(),
            edit_vars = self.edit_vars.len(),
            "Ended edit session"
        );
        Ok(())
    }

    pub fn remove_all_edit_vars(&mut self) -> Result<(), SolverError> {
        self.remove_edit_vars_to(0)
    }

    /// Remove every edit variable added after the first `count`.
    pub fn remove_edit_vars_to(&mut self, count: usize) -> Result<(), SolverError> {
        self.truncate_edit_vars(count, true)
    }

    fn truncate_edit_vars(&mut self, count: usize, settle: bool) -> Result<(), SolverError> {
        let ids: Vec<ConstraintId> = self
            .edit_vars
            .values()
            .skip(count)
            .map(|info| info.constraint)
            .collect();
        for id in ids {
            if settle {
                self.remove_constraint(id)?;
            } else {
                self.detach_constraint(id)?;
            }
        }
        if self.edit_vars.len() > count {
            return Err(SolverError::Internal("edit variables left after removal"));
        }
        Ok(())
    }

    /// Move an edit variable's target. Takes effect on the next `resolve`.
    pub fn suggest_value(&mut self, var: Variable, value: f64) -> Result<(), SolverError> {
        let Some(info) = self.edit_vars.get_mut(&var) else {
            return Err(SolverError::UnknownEditVariable(self.display_name(var)));
        };
        let delta = value - info.prev_edit_constant;
        info.prev_edit_constant = value;
        let (plus, minus) = (info.edit_plus, info.edit_minus);
        trace!(
            component = "solver",
            operation = "suggest_value",
            variable = %var,
            value,
            delta,
            "Suggested value"
        );
        self.delta_edit_constant(delta, plus, minus)
    }

    /// Restore feasibility after suggestions and push the new values.
    pub fn resolve(&mut self) -> Result<(), SolverError> {
        self.dual_optimize()?;
        self.set_external_variables();
        self.tableau.clear_infeasible();
        self.reset_stay_constants();
        debug!(
            component = "solver",
            operation = "resolve",
            status = "success",
            "Resolved edit suggestions"
        );
        Ok(())
    }

    /// Suggest each edit variable by its ordinal index, then resolve.
    pub fn resolve_with(&mut self, values: &[f64]) -> Result<(), SolverError> {
        let suggestions: Vec<(Variable, f64)> = self
            .edit_vars
            .iter()
            .filter_map(|(&var, info)| values.get(info.index).map(|&value| (var, value)))
            .collect();
        for (var, value) in suggestions {
            self.suggest_value(var, value)?;
        }
        self.resolve()
    }

    /// Suggest the first two edit variables, then resolve.
    pub fn resolve_pair(&mut self, x: f64, y: f64) -> Result<(), SolverError> {
        if self.edit_vars.len() < 2 {
            return Err(SolverError::NoEditVariables);
        }
        self.resolve_with(&[x, y])
    }

    /// One-shot edit of a single variable. Variables outside the tableau just
    /// take the value.
    pub fn set_edited_value(&mut self, var: Variable, value: f64) -> Result<(), SolverError> {
        if !self.tableau.contains(var) {
            if let Some(ext) = self.externals.get_mut(&var) {
                self.solve_baseline.entry(var).or_insert(ext.value);
                ext.value = value;
            }
            return Ok(());
        }
        if !approx(value, self.value(var)) {
            self.add_edit_var(var, Strength::STRONG, 1.0)?;
            self.begin_edit()?;
            self.suggest_value(var, value)?;
            self.end_edit()?;
        }
        Ok(())
    }

    /// Re-optimize if anything changed and return every value change since
    /// the previous call.
    pub fn solve(&mut self) -> Result<BTreeMap<Variable, f64>, SolverError> {
        if self.needs_solving {
            self.optimize(self.objective)?;
            self.set_external_variables();
        }
        let baseline = std::mem::take(&mut self.solve_baseline);
        Ok(baseline
            .into_iter()
            .filter_map(|(var, before)| {
                let now = self.value(var);
                (!approx(before, now)).then_some((var, now))
            })
            .collect())
    }

    // ── Row construction ──

    fn new_expression(&mut self, constraint: &Constraint) -> Result<NewRow, SolverError> {
        let source = constraint.expression();
        let mut expr = Expression::from_constant(source.constant());
        for (var, coeff) in source.terms() {
            match self.tableau.row(var) {
                Some(row) => expr.add_expression(row, coeff),
                None => expr.add_variable(var, coeff),
            }
        }

        let weight = constraint.objective_weight();
        let mut row = if constraint.is_inequality() {
            let slack = self.ids.next(VariableKind::Slack);
            expr.set_variable(slack, -1.0);
            let mut error_vars = Vec::new();
            if !constraint.is_required() {
                let minus = self.ids.next(VariableKind::Slack);
                expr.set_variable(minus, 1.0);
                self.tableau.set_row_variable(self.objective, minus, weight)?;
                error_vars.push(minus);
            }
            NewRow {
                expression: Expression::new(),
                marker: slack,
                error_vars,
                edit_vars: None,
            }
        } else if constraint.is_required() {
            let dummy = self.ids.next(VariableKind::Dummy);
            expr.set_variable(dummy, 1.0);
            NewRow {
                expression: Expression::new(),
                marker: dummy,
                error_vars: Vec::new(),
                edit_vars: Some((dummy, dummy)),
            }
        } else {
            let plus = self.ids.next(VariableKind::Slack);
            let minus = self.ids.next(VariableKind::Slack);
            expr.set_variable(plus, -1.0);
            expr.set_variable(minus, 1.0);
            self.tableau.set_row_variable(self.objective, plus, weight)?;
            self.tableau.set_row_variable(self.objective, minus, weight)?;
            NewRow {
                expression: Expression::new(),
                marker: plus,
                error_vars: vec![minus, plus],
                edit_vars: Some((plus, minus)),
            }
        };

        if expr.constant() < 0.0 {
            expr.multiply_me(-1.0);
        }
        row.expression = expr;
        Ok(row)
    }

    /// Insert a fresh row, directly when a subject exists, otherwise through
    /// an artificial variable.
    fn insert_row(&mut self, mut expr: Expression) -> Result<(), SolverError> {
        match self.choose_subject(&mut expr)? {
            Some(subject) => {
                trace!(
                    component = "solver",
                    operation = "choose_subject",
                    subject = %subject,
                    "Adding row directly"
                );
                expr.new_subject(subject);
                if self.tableau.columns_has_key(subject) {
                    self.tableau.substitute_out(subject, &expr)?;
                }
                self.tableau.add_row(subject, expr);
                Ok(())
            }
            None => self.add_with_artificial_variable(expr),
        }
    }

    /// Pick a variable the new row can be solved for without phase 1.
    fn choose_subject(&self, expr: &mut Expression) -> Result<Option<Variable>, SolverError> {
        let mut subject = None;
        let mut found_unrestricted = false;
        let mut found_new_restricted = false;

        for (var, coeff) in expr.terms() {
            if found_unrestricted {
                if !var.is_restricted() && !self.tableau.columns_has_key(var) {
                    return Ok(Some(var));
                }
            } else if var.is_restricted() {
                if !found_new_restricted && !var.is_dummy() && coeff < 0.0 {
                    let trivial = match self.tableau.column(var) {
                        None => true,
                        Some(column) => column.len() == 1 && column.contains(&self.objective),
                    };
                    if trivial {
                        subject = Some(var);
                        found_new_restricted = true;
                    }
                }
            } else {
                subject = Some(var);
                found_unrestricted = true;
            }
        }
        if subject.is_some() {
            return Ok(subject);
        }

        // only dummies left; any other term means phase 1
        let mut dummy = None;
        let mut dummy_coeff = 0.0;
        for (var, coeff) in expr.terms() {
            if !var.is_dummy() {
                return Ok(None);
            }
            if !self.tableau.columns_has_key(var) {
                dummy = Some(var);
                dummy_coeff = coeff;
            }
        }
        if !near_zero(expr.constant()) {
            return Err(SolverError::RequiredFailure);
        }
        if dummy_coeff > 0.0 {
            expr.multiply_me(-1.0);
        }
        Ok(dummy)
    }

    /// Phase 1: minimize an artificial variable standing in for the row. On
    /// failure the tableau is restored to its state before the attempt.
    fn add_with_artificial_variable(&mut self, expr: Expression) -> Result<(), SolverError> {
        let saved = self.tableau.clone();
        let result = self.run_phase_one(expr);
        if result.is_err() {
            self.tableau = saved;
        }
        result
    }

    fn run_phase_one(&mut self, expr: Expression) -> Result<(), SolverError> {
        let artificial = self.ids.next(VariableKind::Slack);
        let az = self.ids.next(VariableKind::Objective);
        trace!(
            component = "solver",
            operation = "phase_one",
            artificial = %artificial,
            "Adding row with artificial variable"
        );

        self.tableau.add_row(az, expr.clone());
        self.tableau.add_row(artificial, expr);
        self.optimize(az)?;

        let residual = self
            .tableau
            .row(az)
            .ok_or(SolverError::Internal("artificial objective row missing"))?
            .constant();
        if !approx(residual, 0.0) {
            return Err(SolverError::RequiredFailure);
        }

        if let Some(row) = self.tableau.row(artificial) {
            if row.is_constant() {
                self.tableau.remove_row(artificial)?;
                self.tableau.remove_row(az)?;
                return Ok(());
            }
            let entry = row
                .any_pivotable_variable()
                .ok_or(SolverError::Internal("artificial row has no pivotable variable"))?;
            self.pivot(entry, artificial)?;
        }
        if self.tableau.is_basic(artificial) {
            return Err(SolverError::Internal("artificial variable still basic"));
        }
        self.tableau.remove_column(artificial);
        self.tableau.remove_row(az)?;
        Ok(())
    }

    // ── Simplex ──

    /// Primal simplex on the row keyed by `objective`.
    fn optimize(&mut self, objective: Variable) -> Result<(), SolverError> {
        self.optimize_count += 1;
        let mut iterations = 0;
        loop {
            let row = self
                .tableau
                .row(objective)
                .ok_or(SolverError::Internal("objective row missing"))?;

            let mut entry = None;
            let mut most_negative = 0.0;
            for (var, coeff) in row.terms() {
                if var.is_pivotable() && coeff < most_negative {
                    most_negative = coeff;
                    entry = Some(var);
                }
            }
            let Some(entry) = entry else {
                return Ok(());
            };
            if most_negative >= -EPSILON {
                return Ok(());
            }

            let column = self
                .tableau
                .column(entry)
                .ok_or(SolverError::Internal("entry variable has no column"))?;
            let mut exit: Option<Variable> = None;
            let mut min_ratio = f64::MAX;
            for &basic in column {
                if !basic.is_pivotable() {
                    continue;
                }
                let basic_row = self
                    .tableau
                    .row(basic)
                    .ok_or(SolverError::Internal("column index names a missing row"))?;
                let coeff = basic_row.coefficient_for(entry);
                if coeff < 0.0 {
                    let ratio = -basic_row.constant() / coeff;
                    if is_better_ratio(ratio, min_ratio, basic, exit) {
                        min_ratio = ratio;
                        exit = Some(basic);
                    }
                }
            }
            let exit = exit.ok_or(SolverError::Internal("objective function is unbounded"))?;

            iterations += 1;
            if iterations > self.config.max_iterations {
                return Err(SolverError::TooDifficult);
            }
            self.pivot(entry, exit)?;
        }
    }

    /// Dual simplex: pivot until no restricted row has a negative constant.
    fn dual_optimize(&mut self) -> Result<(), SolverError> {
        let mut iterations = 0;
        while let Some(exit) = self.tableau.pop_infeasible() {
            let Some(row) = self.tableau.row(exit) else {
                continue;
            };
            if row.constant() >= 0.0 {
                continue;
            }
            let objective = self
                .tableau
                .row(self.objective)
                .ok_or(SolverError::Internal("objective row missing"))?;

            let mut entry: Option<Variable> = None;
            let mut min_ratio = f64::MAX;
            for (var, coeff) in row.terms() {
                if coeff > 0.0 && var.is_pivotable() {
                    let ratio = objective.coefficient_for(var) / coeff;
                    if is_better_ratio(ratio, min_ratio, var, entry) {
                        min_ratio = ratio;
                        entry = Some(var);
                    }
                }
            }
            let entry =
                entry.ok_or(SolverError::Internal("no entry variable in dual optimize"))?;

            iterations += 1;
            if iterations > self.config.max_iterations {
                return Err(SolverError::TooDifficult);
            }
            self.pivot(entry, exit)?;
        }
        Ok(())
    }

    /// Exit row for a non-basic marker about to be removed.
    fn marker_exit(&self, marker: Variable) -> Result<Option<Variable>, SolverError> {
        let Some(column) = self.tableau.column(marker) else {
            return Ok(None);
        };

        let mut exit: Option<Variable> = None;
        let mut min_ratio = 0.0;
        for &basic in column.iter().filter(|b| b.is_restricted()) {
            let row = self
                .tableau
                .row(basic)
                .ok_or(SolverError::Internal("column index names a missing row"))?;
            let coeff = row.coefficient_for(marker);
            if coeff < 0.0 {
                let ratio = -row.constant() / coeff;
                if exit.is_none() || is_better_ratio(ratio, min_ratio, basic, exit) {
                    min_ratio = ratio;
                    exit = Some(basic);
                }
            }
        }

        if exit.is_none() {
            for &basic in column.iter().filter(|b| b.is_restricted()) {
                let row = self
                    .tableau
                    .row(basic)
                    .ok_or(SolverError::Internal("column index names a missing row"))?;
                let ratio = row.constant() / row.coefficient_for(marker);
                if exit.is_none() || ratio < min_ratio {
                    min_ratio = ratio;
                    exit = Some(basic);
                }
            }
        }

        if exit.is_none() {
            exit = column.iter().copied().find(|&basic| basic != self.objective);
        }
        Ok(exit)
    }

    /// Make `entry` basic in place of `exit`.
    fn pivot(&mut self, entry: Variable, exit: Variable) -> Result<(), SolverError> {
        trace!(
            component = "solver",
            operation = "pivot",
            entry = %entry,
            exit = %exit,
            "Pivot"
        );
        let mut expr = self.tableau.remove_row(exit)?;
        expr.change_subject(exit, entry);
        self.tableau.substitute_out(entry, &expr)?;
        self.tableau.add_row(entry, expr);
        Ok(())
    }

    fn delta_edit_constant(
        &mut self,
        delta: f64,
        plus: Variable,
        minus: Variable,
    ) -> Result<(), SolverError> {
        if let Some(row) = self.tableau.row_mut(plus) {
            row.increment_constant(delta);
            if row.constant() < 0.0 {
                self.tableau.mark_infeasible(plus);
            }
            return Ok(());
        }
        if let Some(row) = self.tableau.row_mut(minus) {
            row.increment_constant(-delta);
            if row.constant() < 0.0 {
                self.tableau.mark_infeasible(minus);
            }
            return Ok(());
        }
        self.tableau.shift_column_constants(minus, delta)
    }

    /// Zero the error rows of every stay, making current values the new
    /// stay targets.
    fn reset_stay_constants(&mut self) {
        for (&plus, &minus) in self
            .stay_plus_error_vars
            .iter()
            .zip(&self.stay_minus_error_vars)
        {
            let row = if self.tableau.is_basic(plus) {
                self.tableau.row_mut(plus)
            } else {
                self.tableau.row_mut(minus)
            };
            if let Some(row) = row {
                row.set_constant(0.0);
            }
        }
    }

    /// Copy row constants into the external variables and notify observers.
    fn set_external_variables(&mut self) {
        let mut changed = BTreeMap::new();
        for &var in self.tableau.external_parametric_vars() {
            if self.tableau.is_basic(var) {
                continue;
            }
            if let Some(ext) = self.externals.get_mut(&var) {
                if ext.value != 0.0 {
                    self.solve_baseline.entry(var).or_insert(ext.value);
                    ext.value = 0.0;
                    changed.insert(var, 0.0);
                }
            }
        }
        for &var in self.tableau.external_rows() {
            let Some(row) = self.tableau.row(var) else {
                continue;
            };
            if let Some(ext) = self.externals.get_mut(&var) {
                if ext.value != row.constant() {
                    self.solve_baseline.entry(var).or_insert(ext.value);
                    ext.value = row.constant();
                    changed.insert(var, row.constant());
                }
            }
        }

        self.needs_solving = false;
        for callback in &mut self.callbacks {
            callback(&changed);
        }
    }

    fn joined_names<'a>(&self, vars: impl IntoIterator<Item = &'a Variable>) -> String {
        vars.into_iter()
            .map(|&var| self.display_name(var))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Human readable tableau and solver statistics.
    pub fn internal_info(&self) -> String {
        let mut info = String::new();
        info.push_str("Tableau Information:\n");
        info.push_str(&format!(
            "Rows: {} (= {} constraints)\n",
            self.tableau.row_count(),
            self.tableau.row_count().saturating_sub(1)
        ));
        info.push_str(&format!("Columns: {}\n", self.tableau.column_count()));
        info.push_str(&format!(
            "Infeasible Rows: {}\n",
            self.tableau.infeasible_count()
        ));
        info.push_str(&format!(
            "External basic variables: {} [{}]\n",
            self.tableau.external_rows().len(),
            self.joined_names(self.tableau.external_rows())
        ));
        info.push_str(&format!(
            "External parametric variables: {} [{}]\n",
            self.tableau.external_parametric_vars().len(),
            self.joined_names(self.tableau.external_parametric_vars())
        ));
        info.push_str("\nSolver info:\n");
        info.push_str(&format!(
            "Stay Error Variables: {} ({} +, {} -)\n",
            self.stay_plus_error_vars.len() + self.stay_minus_error_vars.len(),
            self.stay_plus_error_vars.len(),
            self.stay_minus_error_vars.len()
        ));
        info.push_str(&format!("Edit Variables: {}\n", self.edit_vars.len()));
        info.push_str(&format!("Optimize runs: {}\n", self.optimize_count));
        info
    }
}

/// Smaller ratio wins; near ties go to the lower variable id.
fn is_better_ratio(
    ratio: f64,
    best_ratio: f64,
    candidate: Variable,
    best: Option<Variable>,
) -> bool {
    ratio < best_ratio || (approx(ratio, best_ratio) && best.is_some_and(|best| candidate < best))
}

impl fmt::Debug for SimplexSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimplexSolver")
            .field("config", &self.config)
            .field("variables", &self.externals.len())
            .field("constraints", &self.constraints.len())
            .field("rows", &self.tableau.row_count())
            .field("edit_vars", &self.edit_vars.len())
            .field("needs_solving", &self.needs_solving)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Relation;

    fn assert_near(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_required_equality() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        let y = solver.create_variable("y", 0.0);
        solver.add_constraint(Constraint::equation(x, 7.0)).unwrap();
        solver.add_constraint(Constraint::equation(y, x + 3.0)).unwrap();
        assert_near(solver.value(x), 7.0);
        assert_near(solver.value(y), 10.0);
        assert!(solver.tableau.is_consistent());
    }

    #[test]
    fn test_add_delete_inequalities() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        solver
            .add_constraint(Constraint::equation(x, 100.0).with_strength(Strength::WEAK))
            .unwrap();
        let c10 = solver
            .add_constraint(Constraint::inequality(x, Relation::Le, 10.0))
            .unwrap();
        let c20 = solver
            .add_constraint(Constraint::inequality(x, Relation::Le, 20.0))
            .unwrap();
        assert_near(solver.value(x), 10.0);

        solver.remove_constraint(c10).unwrap();
        assert_near(solver.value(x), 20.0);

        solver.remove_constraint(c20).unwrap();
        assert_near(solver.value(x), 100.0);
        assert!(solver.tableau.is_consistent());
    }

    #[test]
    fn test_add_delete_with_dependent_variable() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        let y = solver.create_variable("y", 0.0);
        solver
            .add_constraint(Constraint::equation(x, 100.0).with_strength(Strength::WEAK))
            .unwrap();
        solver
            .add_constraint(Constraint::equation(y, 120.0).with_strength(Strength::STRONG))
            .unwrap();
        let c10 = solver
            .add_constraint(Constraint::inequality(x, Relation::Le, 10.0))
            .unwrap();
        let c20 = solver
            .add_constraint(Constraint::inequality(x, Relation::Le, 20.0))
            .unwrap();
        assert_near(solver.value(x), 10.0);
        assert_near(solver.value(y), 120.0);

        solver.remove_constraint(c10).unwrap();
        assert_near(solver.value(x), 20.0);

        let cxy = solver
            .add_constraint(Constraint::equation(x * 2.0, y))
            .unwrap();
        assert_near(solver.value(x), 20.0);
        assert_near(solver.value(y), 40.0);

        solver.remove_constraint(c20).unwrap();
        assert_near(solver.value(x), 60.0);
        assert_near(solver.value(y), 120.0);

        solver.remove_constraint(cxy).unwrap();
        assert_near(solver.value(x), 100.0);
        assert_near(solver.value(y), 120.0);
    }

    #[test]
    fn test_inconsistent_equalities_roll_back() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        solver.add_constraint(Constraint::equation(x, 10.0)).unwrap();
        let rows = solver.tableau.row_count();

        let err = solver.add_constraint(Constraint::equation(x, 5.0)).unwrap_err();
        assert_eq!(err, SolverError::RequiredFailure);
        assert_eq!(solver.tableau.row_count(), rows);
        assert_near(solver.value(x), 10.0);
        assert!(solver.tableau.is_consistent());
    }

    #[test]
    fn test_inconsistent_inequalities_roll_back() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        solver
            .add_constraint(Constraint::inequality(x, Relation::Ge, 10.0))
            .unwrap();
        let rows = solver.tableau.row_count();
        let columns = solver.tableau.column_count();

        assert!(!solver.try_add_constraint(Constraint::inequality(x, Relation::Le, 5.0)));
        assert_eq!(solver.tableau.row_count(), rows);
        assert_eq!(solver.tableau.column_count(), columns);
        assert_near(solver.value(x), 10.0);
    }

    #[test]
    fn test_constant_contradiction() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        solver.add_constraint(Constraint::equation(x, 10.0)).unwrap();
        let rows = solver.tableau.row_count();

        let err = solver
            .add_constraint(Constraint::equation(5.0, 10.0))
            .unwrap_err();
        assert_eq!(err, SolverError::RequiredFailure);
        assert_eq!(solver.tableau.row_count(), rows);
        assert_eq!(solver.constraints().count(), 1);
    }

    #[test]
    fn test_remove_unknown_constraint() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        let id = solver.add_constraint(Constraint::equation(x, 1.0)).unwrap();
        solver.remove_constraint(id).unwrap();
        assert_eq!(
            solver.remove_constraint(id),
            Err(SolverError::ConstraintNotFound)
        );
    }

    #[test]
    fn test_strength_dominance() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        solver
            .add_constraint(Constraint::equation(x, 0.0).with_strength(Strength::WEAK))
            .unwrap();
        solver
            .add_constraint(Constraint::equation(x, 10.0).with_strength(Strength::STRONG))
            .unwrap();
        assert_near(solver.value(x), 10.0);
    }

    #[test]
    fn test_casso1() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        let y = solver.create_variable("y", 0.0);
        solver
            .add_constraint(Constraint::inequality(x, Relation::Le, y))
            .unwrap();
        solver.add_constraint(Constraint::equation(y, x + 3.0)).unwrap();
        solver
            .add_constraint(Constraint::equation(x, 10.0).with_strength(Strength::WEAK))
            .unwrap();
        solver
            .add_constraint(Constraint::equation(y, 10.0).with_strength(Strength::WEAK))
            .unwrap();

        let (vx, vy) = (solver.value(x), solver.value(y));
        let either = (approx(vx, 10.0) && approx(vy, 13.0)) || (approx(vx, 7.0) && approx(vy, 10.0));
        assert!(either, "unexpected solution x={} y={}", vx, vy);
    }

    #[test]
    fn test_solve_is_idempotent() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        solver.add_constraint(Constraint::equation(x, 3.0)).unwrap();
        let first = solver.solve().unwrap();
        assert_eq!(first.get(&x), Some(&3.0));
        assert!(solver.solve().unwrap().is_empty());
    }

    #[test]
    fn test_solve_skips_values_that_returned() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        let y = solver.create_variable("y", 0.0);
        solver.add_stay(x, Strength::WEAK, 1.0).unwrap();
        solver.add_stay(y, Strength::WEAK, 1.0).unwrap();
        solver.add_constraint(Constraint::equation(y, x + 1.0)).unwrap();
        solver.solve().unwrap();
        let x0 = solver.value(x);

        solver.set_edited_value(x, 5.0).unwrap();
        solver.set_edited_value(x, x0).unwrap();
        let pin = solver.add_constraint(Constraint::equation(x, 9.0)).unwrap();
        assert_near(solver.value(y), 10.0);
        solver.remove_constraint(pin).unwrap();
        solver.set_edited_value(x, x0).unwrap();

        assert_near(solver.value(x), x0);
        assert_near(solver.value(y), x0 + 1.0);
        assert!(solver.solve().unwrap().is_empty());

        solver.set_edited_value(x, x0 + 2.0).unwrap();
        let changes = solver.solve().unwrap();
        assert_eq!(changes.len(), 2);
        assert_near(changes[&y], x0 + 3.0);
    }

    #[test]
    fn test_deferred_solving() {
        let mut solver = SimplexSolver::with_config(SolverConfig::new().with_auto_solve(false));
        let x = solver.create_variable("x", 0.0);
        solver
            .add_constraint(Constraint::equation(x, 4.0).with_strength(Strength::MEDIUM))
            .unwrap();
        assert_eq!(solver.value(x), 0.0);
        let changes = solver.solve().unwrap();
        assert_near(changes[&x], 4.0);
        assert_near(solver.value(x), 4.0);
    }

    #[test]
    fn test_iteration_limit_in_phase_one_rolls_back() {
        let mut solver = SimplexSolver::with_config(SolverConfig::new().with_max_iterations(0));
        let x = solver.create_variable("x", 0.0);
        solver
            .add_constraint(Constraint::equation(x, 100.0).with_strength(Strength::WEAK))
            .unwrap();
        let objective_terms = solver.tableau.row(solver.objective).unwrap().len();

        // needs one phase 1 pivot
        let err = solver
            .add_constraint(Constraint::inequality(x, Relation::Le, 10.0))
            .unwrap_err();
        assert_eq!(err, SolverError::TooDifficult);
        assert_eq!(solver.constraints().count(), 1);
        assert_eq!(
            solver.tableau.row(solver.objective).unwrap().len(),
            objective_terms
        );
        assert_near(solver.value(x), 100.0);
        assert!(solver.tableau.is_consistent());
    }

    #[test]
    fn test_iteration_limit_after_insert_detaches_constraint() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        let y = solver.create_variable("y", 0.0);
        solver
            .add_constraint(Constraint::equation(x, 100.0).with_strength(Strength::WEAK))
            .unwrap();
        solver
            .add_constraint(Constraint::equation(y, 50.0).with_strength(Strength::WEAK))
            .unwrap();
        solver.solve().unwrap();
        let objective_terms = solver.tableau.row(solver.objective).unwrap().len();

        // inserts directly, then needs a pivot to optimize
        solver.config.max_iterations = 0;
        let err = solver
            .add_constraint(Constraint::equation(x, y).with_strength(Strength::STRONG))
            .unwrap_err();
        assert_eq!(err, SolverError::TooDifficult);
        assert_eq!(solver.constraints().count(), 2);
        assert_eq!(solver.marker_vars.len(), 2);
        assert_eq!(solver.error_vars.len(), 2);
        assert_eq!(
            solver.tableau.row(solver.objective).unwrap().len(),
            objective_terms
        );
        assert_near(solver.value(x), 100.0);
        assert_near(solver.value(y), 50.0);
        assert!(solver.tableau.is_consistent());

        solver.config.max_iterations = SolverConfig::default().max_iterations;
        assert!(solver.solve().unwrap().is_empty());
        solver
            .add_constraint(Constraint::equation(x, y).with_strength(Strength::STRONG))
            .unwrap();
        assert_near(solver.value(x), solver.value(y));
    }

    #[test]
    fn test_edit_session() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        let y = solver.create_variable("y", 0.0);
        solver.add_stay(x, Strength::WEAK, 1.0).unwrap();
        solver.add_stay(y, Strength::WEAK, 1.0).unwrap();
        solver.add_constraint(Constraint::equation(y, x * 2.0)).unwrap();

        solver.add_edit_var(x, Strength::STRONG, 1.0).unwrap();
        solver.begin_edit().unwrap();
        solver.suggest_value(x, 5.0).unwrap();
        solver.resolve().unwrap();
        assert_near(solver.value(x), 5.0);
        assert_near(solver.value(y), 10.0);
        solver.end_edit().unwrap();
        assert_eq!(solver.edit_variable_count(), 0);
        assert_near(solver.value(x), 5.0);
        assert!(solver.tableau.is_consistent());
    }

    #[test]
    fn test_edit_protocol_errors() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        assert_eq!(solver.begin_edit(), Err(SolverError::NoEditVariables));
        assert_eq!(
            solver.suggest_value(x, 1.0),
            Err(SolverError::UnknownEditVariable("x".to_string()))
        );
        solver.add_edit_var(x, Strength::STRONG, 1.0).unwrap();
        assert_eq!(
            solver.add_edit_var(x, Strength::STRONG, 1.0),
            Err(SolverError::DuplicateEditVariable("x".to_string()))
        );
        assert_eq!(solver.resolve_pair(1.0, 2.0), Err(SolverError::NoEditVariables));
    }

    #[test]
    fn test_stay_removal_cleans_stay_lists() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 3.0);
        let stay = solver.add_stay(x, Strength::WEAK, 1.0).unwrap();
        assert_eq!(solver.stay_plus_error_vars.len(), 1);
        solver.remove_constraint(stay).unwrap();
        assert!(solver.stay_plus_error_vars.is_empty());
        assert!(solver.stay_minus_error_vars.is_empty());
        assert!(!solver.contains_variable(x));
    }

    #[test]
    fn test_ensure_stays() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        let y = solver.create_variable("y", 0.0);
        solver
            .add_constraint(Constraint::inequality(x, Relation::Le, y))
            .unwrap();
        assert_eq!(solver.ensure_stays(), Err(SolverError::NotEnoughStays));

        solver.add_stay(x, Strength::WEAK, 1.0).unwrap();
        solver.add_stay(y, Strength::WEAK, 1.0).unwrap();
        assert_eq!(solver.ensure_stays(), Ok(()));
    }

    #[test]
    fn test_on_change_reports_changed_variables() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut solver = SimplexSolver::new();
        solver.on_change(move |changed| {
            sink.lock().unwrap().push(changed.clone());
        });
        let x = solver.create_variable("x", 0.0);
        solver.add_constraint(Constraint::equation(x, 2.0)).unwrap();

        let seen = seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.len(), 1);
        assert_near(last[&x], 2.0);
    }

    #[test]
    fn test_internal_info() {
        let mut solver = SimplexSolver::new();
        let x = solver.create_variable("x", 0.0);
        solver.add_stay(x, Strength::WEAK, 1.0).unwrap();
        let info = solver.internal_info();
        assert!(info.contains("Stay Error Variables: 2 (1 +, 1 -)"));
        assert!(info.contains("Edit Variables: 0"));
    }
}
