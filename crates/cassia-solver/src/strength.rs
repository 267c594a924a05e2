use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

const MULTIPLIER: f64 = 1000.0;

/// Lexicographic weight folded into one number, three levels in base 1000.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "_t", rename = "c.SymbolicWeight"))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolicWeight {
    pub value: f64,
}

impl SymbolicWeight {
    pub const fn new(strong: f64, medium: f64, weak: f64) -> Self {
        Self {
            value: strong * MULTIPLIER * MULTIPLIER + medium * MULTIPLIER + weak,
        }
    }
}

/// Named priority level for a constraint.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "_t", rename = "c.Strength"))]
#[derive(Debug, Clone, PartialEq)]
pub struct Strength {
    pub name: Cow<'static, str>,
    pub symbolic_weight: SymbolicWeight,
}

impl Strength {
    pub const REQUIRED: Strength = Strength::constant("<Required>", 1000.0, 1000.0, 1000.0);
    pub const STRONG: Strength = Strength::constant("strong", 1.0, 0.0, 0.0);
    pub const MEDIUM: Strength = Strength::constant("medium", 0.0, 1.0, 0.0);
    pub const WEAK: Strength = Strength::constant("weak", 0.0, 0.0, 1.0);

    const fn constant(name: &'static str, strong: f64, medium: f64, weak: f64) -> Self {
        Self {
            name: Cow::Borrowed(name),
            symbolic_weight: SymbolicWeight::new(strong, medium, weak),
        }
    }

    /// A custom strength between the built-in levels.
    pub fn new(name: impl Into<String>, strong: f64, medium: f64, weak: f64) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            symbolic_weight: SymbolicWeight::new(strong, medium, weak),
        }
    }

    /// Look up a built-in strength by name.
    pub fn from_name(name: &str) -> Option<Strength> {
        match name {
            "required" | "<Required>" => Some(Self::REQUIRED),
            "strong" => Some(Self::STRONG),
            "medium" => Some(Self::MEDIUM),
            "weak" => Some(Self::WEAK),
            _ => None,
        }
    }

    /// Only the built-in required strength is required; a custom strength
    /// with the same weight is still traded off through the objective.
    pub fn is_required(&self) -> bool {
        *self == Self::REQUIRED
    }

    pub fn weight(&self) -> f64 {
        self.symbolic_weight.value
    }
}

impl PartialOrd for Strength {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.is_required(), other.is_required()) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => self.weight().partial_cmp(&other.weight()),
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_required() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.weight())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_weights() {
        assert_eq!(Strength::STRONG.weight(), 1_000_000.0);
        assert_eq!(Strength::MEDIUM.weight(), 1_000.0);
        assert_eq!(Strength::WEAK.weight(), 1.0);
        assert_eq!(Strength::REQUIRED.weight(), 1_001_001_000.0);
    }

    #[test]
    fn test_stronger_level_dominates_weaker_sums() {
        // 999 medium units stay below a single strong unit
        assert!(Strength::STRONG.weight() > 999.0 * Strength::MEDIUM.weight());
        assert!(Strength::MEDIUM.weight() > 999.0 * Strength::WEAK.weight());
    }

    #[test]
    fn test_required_is_identity_based() {
        assert!(Strength::REQUIRED.is_required());
        assert!(!Strength::new("custom", 1000.0, 1000.0, 1000.0).is_required());
        assert!(!Strength::STRONG.is_required());
    }

    #[test]
    fn test_ordering() {
        assert!(Strength::REQUIRED > Strength::STRONG);
        assert!(Strength::STRONG > Strength::MEDIUM);
        assert!(Strength::MEDIUM > Strength::WEAK);
        assert!(Strength::new("huge", 5000.0, 0.0, 0.0) < Strength::REQUIRED);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Strength::from_name("medium"), Some(Strength::MEDIUM));
        assert_eq!(Strength::from_name("required"), Some(Strength::REQUIRED));
        assert_eq!(Strength::from_name("bogus"), None);
    }
}
