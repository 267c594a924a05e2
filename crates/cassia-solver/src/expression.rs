//! Linear expressions: `constant + Σ coefficient * variable`.
//!
//! Terms are kept in a map ordered by variable id, so iteration is
//! deterministic and matches creation order. Coefficients that cancel to
//! (approximately) zero are pruned eagerly.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use crate::error::SolverError;
use crate::variable::Variable;

/// Tolerance for floating point comparisons.
pub const EPSILON: f64 = 1e-8;

/// Approximate equality: absolute near zero, relative elsewhere.
pub fn approx(a: f64, b: f64) -> bool {
    if a == b {
        true
    } else if a == 0.0 {
        b.abs() < EPSILON
    } else if b == 0.0 {
        a.abs() < EPSILON
    } else {
        (a - b).abs() < a.abs() * EPSILON
    }
}

pub(crate) fn near_zero(value: f64) -> bool {
    approx(value, 0.0)
}

/// Receives term insertions and removals on tableau rows so the column index
/// can follow in-place row mutation.
pub(crate) trait TermListener {
    fn note_added_variable(&mut self, var: Variable, subject: Variable);
    fn note_removed_variable(&mut self, var: Variable, subject: Variable);
}

#[derive(Debug, Clone, Default)]
pub struct Expression {
    constant: f64,
    terms: BTreeMap<Variable, f64>,
}

impl Expression {
    /// The zero expression.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_constant(constant: f64) -> Self {
        Self {
            constant,
            terms: BTreeMap::new(),
        }
    }

    pub fn from_variable(var: Variable) -> Self {
        Self::from_term(var, 1.0, 0.0)
    }

    /// `coefficient * var + constant`
    pub fn from_term(var: Variable, coefficient: f64, constant: f64) -> Self {
        let mut expr = Self::from_constant(constant);
        expr.add_variable(var, coefficient);
        expr
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn terms(&self) -> impl Iterator<Item = (Variable, f64)> + '_ {
        self.terms.iter().map(|(&v, &c)| (v, c))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// True when the expression has no variable terms.
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Coefficient of `var`, or 0 when absent.
    pub fn coefficient_for(&self, var: Variable) -> f64 {
        self.terms.get(&var).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, var: Variable) -> bool {
        self.terms.contains_key(&var)
    }

    pub fn plus(&self, other: impl Into<Expression>) -> Expression {
        let mut result = self.clone();
        result.add_expression(&other.into(), 1.0);
        result
    }

    pub fn minus(&self, other: impl Into<Expression>) -> Expression {
        let mut result = self.clone();
        result.add_expression(&other.into(), -1.0);
        result
    }

    /// Product of two expressions. One side must be a pure constant.
    pub fn times(&self, other: impl Into<Expression>) -> Result<Expression, SolverError> {
        let other = other.into();
        if self.is_constant() {
            Ok(other.scaled(self.constant))
        } else if other.is_constant() {
            Ok(self.scaled(other.constant))
        } else {
            Err(SolverError::NonExpression)
        }
    }

    /// Quotient of two expressions. The divisor must be a nonzero constant.
    pub fn divide(&self, other: impl Into<Expression>) -> Result<Expression, SolverError> {
        let other = other.into();
        if !other.is_constant() || near_zero(other.constant) {
            return Err(SolverError::NonExpression);
        }
        Ok(self.scaled(1.0 / other.constant))
    }

    fn scaled(&self, factor: f64) -> Expression {
        let mut result = self.clone();
        result.multiply_me(factor);
        result
    }

    // ── In-place mutation, only on solver-owned expressions ──

    pub(crate) fn set_constant(&mut self, constant: f64) {
        self.constant = constant;
    }

    pub(crate) fn increment_constant(&mut self, delta: f64) {
        self.constant += delta;
    }

    pub(crate) fn multiply_me(&mut self, factor: f64) {
        self.constant *= factor;
        for coeff in self.terms.values_mut() {
            *coeff *= factor;
        }
    }

    pub(crate) fn set_variable(&mut self, var: Variable, coefficient: f64) {
        self.terms.insert(var, coefficient);
    }

    pub(crate) fn remove_variable(&mut self, var: Variable) -> Option<f64> {
        self.terms.remove(&var)
    }

    pub(crate) fn add_variable(&mut self, var: Variable, coefficient: f64) {
        match self.terms.get(&var).copied() {
            Some(existing) => {
                let sum = existing + coefficient;
                if near_zero(sum) {
                    self.terms.remove(&var);
                } else {
                    self.terms.insert(var, sum);
                }
            }
            None => {
                if !near_zero(coefficient) {
                    self.terms.insert(var, coefficient);
                }
            }
        }
    }

    /// `add_variable` on a tableau row, reporting membership changes.
    pub(crate) fn add_variable_noting<L: TermListener>(
        &mut self,
        var: Variable,
        coefficient: f64,
        subject: Variable,
        listener: &mut L,
    ) {
        match self.terms.get(&var).copied() {
            Some(existing) => {
                let sum = existing + coefficient;
                if near_zero(sum) {
                    listener.note_removed_variable(var, subject);
                    self.terms.remove(&var);
                } else {
                    self.terms.insert(var, sum);
                }
            }
            None => {
                if !near_zero(coefficient) {
                    self.terms.insert(var, coefficient);
                    listener.note_added_variable(var, subject);
                }
            }
        }
    }

    pub(crate) fn add_expression(&mut self, other: &Expression, multiplier: f64) {
        self.constant += multiplier * other.constant;
        for (&var, &coeff) in &other.terms {
            self.add_variable(var, coeff * multiplier);
        }
    }

    pub(crate) fn add_expression_noting<L: TermListener>(
        &mut self,
        other: &Expression,
        multiplier: f64,
        subject: Variable,
        listener: &mut L,
    ) {
        self.constant += multiplier * other.constant;
        for (&var, &coeff) in &other.terms {
            self.add_variable_noting(var, coeff * multiplier, subject, listener);
        }
    }

    /// Replace `old` by `expr` in this row.
    pub(crate) fn substitute_out<L: TermListener>(
        &mut self,
        old: Variable,
        expr: &Expression,
        subject: Variable,
        listener: &mut L,
    ) {
        let Some(multiplier) = self.terms.remove(&old) else {
            return;
        };
        self.constant += multiplier * expr.constant;
        for (&var, &coeff) in &expr.terms {
            match self.terms.get(&var).copied() {
                Some(existing) => {
                    let updated = existing + multiplier * coeff;
                    if near_zero(updated) {
                        listener.note_removed_variable(var, subject);
                        self.terms.remove(&var);
                    } else {
                        self.terms.insert(var, updated);
                    }
                }
                None => {
                    self.terms.insert(var, multiplier * coeff);
                    listener.note_added_variable(var, subject);
                }
            }
        }
    }

    /// Rewrite the row `old_subject = self` as `new_subject = ...`.
    pub(crate) fn change_subject(&mut self, old_subject: Variable, new_subject: Variable) {
        let reciprocal = self.new_subject(new_subject);
        self.set_variable(old_subject, reciprocal);
    }

    /// Solve `0 = self` for `subject`, removing it from the terms. Returns the
    /// reciprocal of its former coefficient.
    pub(crate) fn new_subject(&mut self, subject: Variable) -> f64 {
        let coeff = self.terms.remove(&subject).unwrap_or(1.0);
        let reciprocal = 1.0 / coeff;
        self.multiply_me(-reciprocal);
        reciprocal
    }

    pub(crate) fn any_pivotable_variable(&self) -> Option<Variable> {
        self.terms.keys().copied().find(|v| v.is_pivotable())
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        approx(self.constant, other.constant)
            && self.terms.len() == other.terms.len()
            && self
                .terms
                .iter()
                .all(|(var, &coeff)| other.terms.get(var).is_some_and(|&c| approx(coeff, c)))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if !near_zero(self.constant) || self.is_constant() {
            write!(f, "{}", self.constant)?;
            first = false;
        }
        for (var, coeff) in &self.terms {
            if !first {
                write!(f, " + ")?;
            }
            write!(f, "{}*{}", coeff, var)?;
            first = false;
        }
        Ok(())
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::from_constant(value)
    }
}

impl From<Variable> for Expression {
    fn from(var: Variable) -> Self {
        Expression::from_variable(var)
    }
}

impl From<&Expression> for Expression {
    fn from(expr: &Expression) -> Self {
        expr.clone()
    }
}

impl<T: Into<Expression>> Add<T> for Expression {
    type Output = Expression;

    fn add(mut self, rhs: T) -> Expression {
        self.add_expression(&rhs.into(), 1.0);
        self
    }
}

impl<T: Into<Expression>> Sub<T> for Expression {
    type Output = Expression;

    fn sub(mut self, rhs: T) -> Expression {
        self.add_expression(&rhs.into(), -1.0);
        self
    }
}

impl Mul<f64> for Expression {
    type Output = Expression;

    fn mul(mut self, rhs: f64) -> Expression {
        self.multiply_me(rhs);
        self
    }
}

impl Neg for Expression {
    type Output = Expression;

    fn neg(self) -> Expression {
        self * -1.0
    }
}

impl<T: Into<Expression>> Add<T> for Variable {
    type Output = Expression;

    fn add(self, rhs: T) -> Expression {
        Expression::from_variable(self) + rhs
    }
}

impl<T: Into<Expression>> Sub<T> for Variable {
    type Output = Expression;

    fn sub(self, rhs: T) -> Expression {
        Expression::from_variable(self) - rhs
    }
}

impl Mul<f64> for Variable {
    type Output = Expression;

    fn mul(self, rhs: f64) -> Expression {
        Expression::from_term(self, rhs, 0.0)
    }
}

impl Neg for Variable {
    type Output = Expression;

    fn neg(self) -> Expression {
        self * -1.0
    }
}

impl Add<Variable> for f64 {
    type Output = Expression;

    fn add(self, rhs: Variable) -> Expression {
        Expression::from_term(rhs, 1.0, self)
    }
}

impl Add<Expression> for f64 {
    type Output = Expression;

    fn add(self, rhs: Expression) -> Expression {
        rhs + self
    }
}

impl Sub<Variable> for f64 {
    type Output = Expression;

    fn sub(self, rhs: Variable) -> Expression {
        Expression::from_term(rhs, -1.0, self)
    }
}

impl Sub<Expression> for f64 {
    type Output = Expression;

    fn sub(self, rhs: Expression) -> Expression {
        -rhs + self
    }
}

impl Mul<Variable> for f64 {
    type Output = Expression;

    fn mul(self, rhs: Variable) -> Expression {
        rhs * self
    }
}

impl Mul<Expression> for f64 {
    type Output = Expression;

    fn mul(self, rhs: Expression) -> Expression {
        rhs * self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{IdGenerator, VariableKind};

    fn vars() -> (Variable, Variable) {
        let mut ids = IdGenerator::default();
        (ids.next(VariableKind::External), ids.next(VariableKind::External))
    }

    #[test]
    fn test_approx() {
        assert!(approx(0.0, 1e-9));
        assert!(!approx(0.0, 1e-7));
        assert!(approx(1e6, 1e6 + 1e-4));
        assert!(!approx(1.0, 1.001));
    }

    #[test]
    fn test_arithmetic() {
        let (x, y) = vars();
        let expr = x * 2.0 + y + 3.0;
        assert_eq!(expr.coefficient_for(x), 2.0);
        assert_eq!(expr.coefficient_for(y), 1.0);
        assert_eq!(expr.constant(), 3.0);

        let diff = expr.minus(x * 2.0);
        assert!(!diff.contains(x), "cancelled terms are pruned");
        assert_eq!(diff.len(), 1);
    }

    #[test]
    fn test_near_zero_coefficients_are_pruned() {
        let (x, _) = vars();
        let expr = Expression::from_variable(x).minus(Expression::from_term(x, 1.0 - 1e-10, 0.0));
        assert!(expr.is_constant());
    }

    #[test]
    fn test_times_requires_constant_operand() {
        let (x, y) = vars();
        let scaled = Expression::from_variable(x).times(4.0).unwrap();
        assert_eq!(scaled.coefficient_for(x), 4.0);

        let scaled = Expression::from_constant(3.0).times(x + 1.0).unwrap();
        assert_eq!(scaled.coefficient_for(x), 3.0);
        assert_eq!(scaled.constant(), 3.0);

        assert_eq!(
            Expression::from_variable(x).times(y),
            Err(SolverError::NonExpression)
        );
    }

    #[test]
    fn test_divide() {
        let (x, y) = vars();
        let half = (x * 4.0 + 2.0).divide(2.0).unwrap();
        assert_eq!(half.coefficient_for(x), 2.0);
        assert_eq!(half.constant(), 1.0);

        assert_eq!((x + 1.0).divide(0.0), Err(SolverError::NonExpression));
        assert_eq!((x + 1.0).divide(y), Err(SolverError::NonExpression));
    }

    #[test]
    fn test_coefficient_for_absent_variable() {
        let (x, y) = vars();
        assert_eq!(Expression::from_variable(x).coefficient_for(y), 0.0);
    }

    #[test]
    fn test_equality_is_approximate() {
        let (x, _) = vars();
        let a = x * 2.0 + 1.0;
        let b = x * (2.0 + 1e-12) + 1.0;
        assert_eq!(a, b);
        assert_ne!(a, x * 3.0 + 1.0);
    }

    #[test]
    fn test_change_subject() {
        let (x, y) = vars();
        // x = 2y + 4  =>  y = 0.5x - 2
        let mut row = y * 2.0 + 4.0;
        row.change_subject(x, y);
        assert_eq!(row.coefficient_for(x), 0.5);
        assert_eq!(row.constant(), -2.0);
        assert!(!row.contains(y));
    }

    #[test]
    fn test_display() {
        let (x, _) = vars();
        assert_eq!(Expression::from_constant(5.0).to_string(), "5");
        assert_eq!((x * 2.0).to_string(), "2*v1");
    }
}
