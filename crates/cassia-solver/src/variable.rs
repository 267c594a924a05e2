use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The role a variable plays in the tableau.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// User-visible variable holding a solution value.
    External,
    /// Slack, error or artificial variable. Restricted to be >= 0.
    Slack,
    /// Marker for a required equality. Zero in every valid solution.
    Dummy,
    /// Key of an objective row.
    Objective,
}

impl VariableKind {
    pub fn is_dummy(self) -> bool {
        matches!(self, VariableKind::Dummy)
    }

    pub fn is_external(self) -> bool {
        matches!(self, VariableKind::External)
    }

    pub fn is_pivotable(self) -> bool {
        matches!(self, VariableKind::Slack)
    }

    pub fn is_restricted(self) -> bool {
        matches!(self, VariableKind::Slack | VariableKind::Dummy)
    }

    fn prefix(self) -> &'static str {
        match self {
            VariableKind::External => "v",
            VariableKind::Slack => "s",
            VariableKind::Dummy => "d",
            VariableKind::Objective => "o",
        }
    }
}

/// Identity-bearing handle for a solver variable.
///
/// Equality, hashing and ordering use the sequential id only, so ordered maps
/// keyed by `Variable` iterate in creation order. Ids are local to the solver
/// that allocated them.
#[derive(Debug, Clone, Copy)]
pub struct Variable {
    id: u64,
    kind: VariableKind,
}

impl Variable {
    pub(crate) fn new(id: u64, kind: VariableKind) -> Self {
        Self { id, kind }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn is_dummy(&self) -> bool {
        self.kind.is_dummy()
    }

    pub fn is_external(&self) -> bool {
        self.kind.is_external()
    }

    pub fn is_pivotable(&self) -> bool {
        self.kind.is_pivotable()
    }

    pub fn is_restricted(&self) -> bool {
        self.kind.is_restricted()
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.id)
    }
}

/// Sequential id source owned by one solver.
#[derive(Debug, Clone)]
pub(crate) struct IdGenerator {
    next: u64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdGenerator {
    pub fn next(&mut self, kind: VariableKind) -> Variable {
        let var = Variable::new(self.next, kind);
        self.next += 1;
        var
    }
}

/// A pair of external variables, as used by `add_point_stays`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: Variable,
    pub y: Variable,
}
