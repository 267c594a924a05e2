//! Tagged serialization of a constraint system.
//!
//! Every record carries a `_t` type tag. Variables are referenced by name,
//! never by id, so a snapshot can be loaded into a fresh solver.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SolverConfig;
use crate::constraint::{Constraint, ConstraintKind};
use crate::error::SolverError;
use crate::expression::Expression;
use crate::solver::SimplexSolver;
use crate::strength::Strength;
use crate::variable::{Variable, VariableKind};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Constraint references unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("Variable '{0}' is defined more than once")]
    DuplicateVariable(String),
    #[error("Variable '{0}' is solver-internal and cannot be loaded")]
    InternalVariable(String),
    #[error(transparent)]
    Solver(#[from] SolverError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_t")]
pub enum VariableRecord {
    #[serde(rename = "c.Variable")]
    External { name: String, value: f64 },
    #[serde(rename = "c.SlackVariable")]
    Slack { name: String, value: f64 },
    #[serde(rename = "c.DummyVariable")]
    Dummy { name: String, value: f64 },
    #[serde(rename = "c.ObjectiveVariable")]
    Objective { name: String, value: f64 },
}

impl VariableRecord {
    pub fn name(&self) -> &str {
        match self {
            VariableRecord::External { name, .. }
            | VariableRecord::Slack { name, .. }
            | VariableRecord::Dummy { name, .. }
            | VariableRecord::Objective { name, .. } => name,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            VariableRecord::External { value, .. }
            | VariableRecord::Slack { value, .. }
            | VariableRecord::Dummy { value, .. }
            | VariableRecord::Objective { value, .. } => *value,
        }
    }

    pub fn kind(&self) -> VariableKind {
        match self {
            VariableRecord::External { .. } => VariableKind::External,
            VariableRecord::Slack { .. } => VariableKind::Slack,
            VariableRecord::Dummy { .. } => VariableKind::Dummy,
            VariableRecord::Objective { .. } => VariableKind::Objective,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermRecord {
    pub variable: String,
    pub coefficient: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionRecord {
    pub constant: f64,
    pub terms: Vec<TermRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_t")]
pub enum ConstraintRecord {
    /// `expression == 0`
    #[serde(rename = "c.Equation")]
    Equation {
        expression: ExpressionRecord,
        strength: Strength,
        weight: f64,
    },
    /// `expression >= 0`
    #[serde(rename = "c.Inequality")]
    Inequality {
        expression: ExpressionRecord,
        strength: Strength,
        weight: f64,
    },
    #[serde(rename = "c.StayConstraint")]
    Stay {
        variable: String,
        value: f64,
        strength: Strength,
        weight: f64,
    },
    #[serde(rename = "c.EditConstraint")]
    Edit {
        variable: String,
        value: f64,
        strength: Strength,
        weight: f64,
    },
}

/// Variables and constraints of one solver, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub variables: Vec<VariableRecord>,
    pub constraints: Vec<ConstraintRecord>,
}

impl SimplexSolver {
    /// Serialize every external variable and constraint. Variables sharing a
    /// name are written as `name#<id>` so the snapshot loads back.
    pub fn snapshot(&self) -> SystemSnapshot {
        let names = self.record_names();
        let variables = self
            .variables()
            .map(|(var, _, value)| VariableRecord::External {
                name: record_name(&names, var),
                value,
            })
            .collect();
        let constraints = self
            .constraints()
            .map(|(_, constraint)| constraint_record(&names, constraint))
            .collect();
        SystemSnapshot {
            variables,
            constraints,
        }
    }

    fn record_names(&self) -> BTreeMap<Variable, String> {
        let mut taken = BTreeSet::new();
        let mut names = BTreeMap::new();
        for (var, name, _) in self.variables() {
            let mut unique = name.to_string();
            while taken.contains(&unique) {
                unique = format!("{}#{}", unique, var.id());
            }
            taken.insert(unique.clone());
            names.insert(var, unique);
        }
        names
    }

    /// Rebuild a solver from a snapshot. Returns the solver and its
    /// variables by name.
    pub fn from_snapshot(
        snapshot: &SystemSnapshot,
    ) -> Result<(SimplexSolver, BTreeMap<String, Variable>), SnapshotError> {
        Self::from_snapshot_with_config(snapshot, SolverConfig::default())
    }

    pub fn from_snapshot_with_config(
        snapshot: &SystemSnapshot,
        config: SolverConfig,
    ) -> Result<(SimplexSolver, BTreeMap<String, Variable>), SnapshotError> {
        let mut solver = SimplexSolver::with_config(config);
        let mut vars = BTreeMap::new();

        for record in &snapshot.variables {
            if record.kind() != VariableKind::External {
                return Err(SnapshotError::InternalVariable(record.name().to_string()));
            }
            if vars.contains_key(record.name()) {
                return Err(SnapshotError::DuplicateVariable(record.name().to_string()));
            }
            let var = solver.create_variable(record.name(), record.value());
            vars.insert(record.name().to_string(), var);
        }

        let lookup = |name: &str| {
            vars.get(name)
                .copied()
                .ok_or_else(|| SnapshotError::UnknownVariable(name.to_string()))
        };
        let to_expression = |record: &ExpressionRecord| -> Result<Expression, SnapshotError> {
            let mut expr = Expression::from_constant(record.constant);
            for term in &record.terms {
                expr = expr + lookup(&term.variable)? * term.coefficient;
            }
            Ok(expr)
        };

        for record in &snapshot.constraints {
            let constraint = match record {
                ConstraintRecord::Equation {
                    expression,
                    strength,
                    weight,
                } => Constraint::new_equation(to_expression(expression)?)
                    .with_strength(strength.clone())
                    .with_weight(*weight),
                ConstraintRecord::Inequality {
                    expression,
                    strength,
                    weight,
                } => Constraint::new_inequality(to_expression(expression)?)
                    .with_strength(strength.clone())
                    .with_weight(*weight),
                ConstraintRecord::Stay {
                    variable,
                    value,
                    strength,
                    weight,
                } => Constraint::stay(lookup(variable)?, *value)
                    .with_strength(strength.clone())
                    .with_weight(*weight),
                ConstraintRecord::Edit {
                    variable,
                    value,
                    strength,
                    weight,
                } => Constraint::edit(lookup(variable)?, *value)
                    .with_strength(strength.clone())
                    .with_weight(*weight),
            };
            solver.add_constraint(constraint)?;
        }

        Ok((solver, vars))
    }
}

fn record_name(names: &BTreeMap<Variable, String>, var: Variable) -> String {
    names.get(&var).cloned().unwrap_or_else(|| var.to_string())
}

fn constraint_record(names: &BTreeMap<Variable, String>, constraint: &Constraint) -> ConstraintRecord {
    let strength = constraint.strength().clone();
    let weight = constraint.weight();
    match constraint.kind() {
        ConstraintKind::Equation => ConstraintRecord::Equation {
            expression: expression_record(names, constraint.expression()),
            strength,
            weight,
        },
        ConstraintKind::Inequality => ConstraintRecord::Inequality {
            expression: expression_record(names, constraint.expression()),
            strength,
            weight,
        },
        ConstraintKind::Stay(var) => ConstraintRecord::Stay {
            variable: record_name(names, var),
            value: constraint.expression().constant(),
            strength,
            weight,
        },
        ConstraintKind::Edit(var) => ConstraintRecord::Edit {
            variable: record_name(names, var),
            value: constraint.expression().constant(),
            strength,
            weight,
        },
    }
}

fn expression_record(names: &BTreeMap<Variable, String>, expr: &Expression) -> ExpressionRecord {
    ExpressionRecord {
        constant: expr.constant(),
        terms: expr
            .terms()
            .map(|(var, coefficient)| TermRecord {
                variable: record_name(names, var),
                coefficient,
            })
            .collect(),
    }
}
