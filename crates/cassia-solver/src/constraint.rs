//! Constraints normalized to `expr == 0` or `expr >= 0`.

use std::fmt;

use crate::expression::Expression;
use crate::strength::Strength;
use crate::variable::Variable;

/// Direction of an inequality between two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `lhs >= rhs`
    Ge,
    /// `lhs <= rhs`
    Le,
}

/// One side of a constraint before normalization.
#[derive(Debug, Clone)]
pub enum Operand {
    Variable(Variable),
    Expression(Expression),
    Constant(f64),
}

impl From<Variable> for Operand {
    fn from(var: Variable) -> Self {
        Operand::Variable(var)
    }
}

impl From<Expression> for Operand {
    fn from(expr: Expression) -> Self {
        Operand::Expression(expr)
    }
}

impl From<&Expression> for Operand {
    fn from(expr: &Expression) -> Self {
        Operand::Expression(expr.clone())
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Constant(value)
    }
}

impl From<Operand> for Expression {
    fn from(operand: Operand) -> Self {
        match operand {
            Operand::Variable(var) => Expression::from_variable(var),
            Operand::Expression(expr) => expr,
            Operand::Constant(value) => Expression::from_constant(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// `expression == 0`
    Equation,
    /// `expression >= 0`
    Inequality,
    /// Keeps a variable at its current value.
    Stay(Variable),
    /// Marks a variable as suggestible during an edit session.
    Edit(Variable),
}

#[derive(Debug, Clone)]
pub struct Constraint {
    expression: Expression,
    kind: ConstraintKind,
    strength: Strength,
    weight: f64,
}

impl Constraint {
    fn from_parts(expression: Expression, kind: ConstraintKind, strength: Strength) -> Self {
        Self {
            expression,
            kind,
            strength,
            weight: 1.0,
        }
    }

    /// `expression == 0`, required.
    pub fn new_equation(expression: Expression) -> Self {
        Self::from_parts(expression, ConstraintKind::Equation, Strength::REQUIRED)
    }

    /// `expression >= 0`, required.
    pub fn new_inequality(expression: Expression) -> Self {
        Self::from_parts(expression, ConstraintKind::Inequality, Strength::REQUIRED)
    }

    /// `lhs == rhs`, required.
    ///
    /// A variable on the left of an expression or constant is moved to the
    /// right (`rhs - lhs == 0`); every other combination yields `lhs - rhs`.
    pub fn equation(lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Self {
        let expression = match (lhs.into(), rhs.into()) {
            (Operand::Variable(var), Operand::Expression(mut expr)) => {
                expr.add_variable(var, -1.0);
                expr
            }
            (Operand::Variable(var), Operand::Constant(value)) => {
                let mut expr = Expression::from_constant(value);
                expr.add_variable(var, -1.0);
                expr
            }
            (Operand::Expression(mut expr), Operand::Variable(var)) => {
                expr.add_variable(var, -1.0);
                expr
            }
            (lhs, rhs) => {
                let mut expr = Expression::from(lhs);
                expr.add_expression(&Expression::from(rhs), -1.0);
                expr
            }
        };
        Self::new_equation(expression)
    }

    /// `lhs >= rhs` or `lhs <= rhs`, required, normalized to `expr >= 0`.
    ///
    /// Which operand is cloned first depends on the operand kinds, so that
    /// equivalent inputs always produce the same row shape.
    pub fn inequality(lhs: impl Into<Operand>, relation: Relation, rhs: impl Into<Operand>) -> Self {
        use Operand::{Constant, Expression as Expr, Variable as Var};

        let expression = match (lhs.into(), rhs.into()) {
            (lhs @ (Expr(_) | Constant(_)), Var(var)) => {
                let mut expr = Expression::from(lhs);
                match relation {
                    Relation::Le => {
                        expr.multiply_me(-1.0);
                        expr.add_variable(var, 1.0);
                    }
                    Relation::Ge => expr.add_variable(var, -1.0),
                }
                expr
            }
            (Var(var), rhs @ (Expr(_) | Constant(_))) => {
                let mut expr = Expression::from(rhs);
                match relation {
                    Relation::Ge => {
                        expr.multiply_me(-1.0);
                        expr.add_variable(var, 1.0);
                    }
                    Relation::Le => expr.add_variable(var, -1.0),
                }
                expr
            }
            (Expr(mut expr), Constant(value)) => {
                match relation {
                    Relation::Le => {
                        expr.multiply_me(-1.0);
                        expr.add_expression(&Expression::from_constant(value), 1.0);
                    }
                    Relation::Ge => expr.add_expression(&Expression::from_constant(value), -1.0),
                }
                expr
            }
            (Constant(value), Expr(mut expr)) => {
                match relation {
                    Relation::Ge => {
                        expr.multiply_me(-1.0);
                        expr.add_expression(&Expression::from_constant(value), 1.0);
                    }
                    Relation::Le => expr.add_expression(&Expression::from_constant(value), -1.0),
                }
                expr
            }
            (Expr(lhs), Expr(mut expr)) => {
                match relation {
                    Relation::Ge => {
                        expr.multiply_me(-1.0);
                        expr.add_expression(&lhs, 1.0);
                    }
                    Relation::Le => expr.add_expression(&lhs, -1.0),
                }
                expr
            }
            (lhs @ (Var(_) | Constant(_)), rhs @ (Var(_) | Constant(_))) => {
                let lhs = Expression::from(lhs);
                let mut expr = Expression::from(rhs);
                match relation {
                    Relation::Ge => {
                        expr.multiply_me(-1.0);
                        expr.add_expression(&lhs, 1.0);
                    }
                    Relation::Le => expr.add_expression(&lhs, -1.0),
                }
                expr
            }
        };
        Self::new_inequality(expression)
    }

    /// `value - var == 0` at weak strength.
    pub fn stay(var: Variable, value: f64) -> Self {
        Self::from_parts(
            Expression::from_term(var, -1.0, value),
            ConstraintKind::Stay(var),
            Strength::WEAK,
        )
    }

    /// `value - var == 0` at strong strength, for edit sessions.
    pub fn edit(var: Variable, value: f64) -> Self {
        Self::from_parts(
            Expression::from_term(var, -1.0, value),
            ConstraintKind::Edit(var),
            Strength::STRONG,
        )
    }

    pub fn with_strength(mut self, strength: Strength) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    pub fn strength(&self) -> &Strength {
        &self.strength
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_required(&self) -> bool {
        self.strength.is_required()
    }

    pub fn is_inequality(&self) -> bool {
        matches!(self.kind, ConstraintKind::Inequality)
    }

    pub fn is_stay(&self) -> bool {
        matches!(self.kind, ConstraintKind::Stay(_))
    }

    pub fn is_edit(&self) -> bool {
        matches!(self.kind, ConstraintKind::Edit(_))
    }

    /// The pinned variable of a stay or edit constraint.
    pub fn variable(&self) -> Option<Variable> {
        match self.kind {
            ConstraintKind::Stay(var) | ConstraintKind::Edit(var) => Some(var),
            ConstraintKind::Equation | ConstraintKind::Inequality => None,
        }
    }

    /// Coefficient the error variables of this constraint get in the objective.
    pub(crate) fn objective_weight(&self) -> f64 {
        self.strength.weight() * self.weight
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            ConstraintKind::Stay(_) => "stay:",
            ConstraintKind::Edit(_) => "edit:",
            ConstraintKind::Equation | ConstraintKind::Inequality => "",
        };
        let op = if self.is_inequality() { ">=" } else { "=" };
        write!(
            f,
            "{}{} {{{}}} ({} {} 0)",
            prefix, self.strength, self.weight, self.expression, op
        )
    }
}
