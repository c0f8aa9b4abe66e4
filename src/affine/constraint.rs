//! Affine constraints and their boolean combinations.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use super::function::AffineFunction;
use super::iter_vec::IterationVector;

/// The relation of an [`AffineConstraint`], read as `f(x) R 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `f(x) = 0`
    Eq,
    /// `f(x) ≠ 0`
    Ne,
    /// `f(x) < 0`
    Lt,
    /// `f(x) ≤ 0`
    Le,
    /// `f(x) > 0`
    Gt,
    /// `f(x) ≥ 0`
    Ge,
    /// `f(x) ≡ 0 (mod m)` — the stride constraint added by strip-mining.
    ModEq(i64),
}

impl Display for Relation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Eq => write!(f, "=="),
            Relation::Ne => write!(f, "!="),
            Relation::Lt => write!(f, "<"),
            Relation::Le => write!(f, "<="),
            Relation::Gt => write!(f, ">"),
            Relation::Ge => write!(f, ">="),
            Relation::ModEq(m) => write!(f, "== 0 mod {m}"),
        }
    }
}

/// A single affine constraint `f(x) R 0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffineConstraint {
    /// The left-hand side linear form.
    pub function: AffineFunction,
    /// The relation against zero.
    pub relation: Relation,
}

impl AffineConstraint {
    /// Creates the constraint `function R 0`.
    #[must_use]
    pub const fn new(function: AffineFunction, relation: Relation) -> Self {
        Self { function, relation }
    }

    /// Checks whether the constraint holds at the given integer point.
    #[must_use]
    pub fn holds_at(&self, point: &[i64]) -> bool {
        let value = self.function.eval(point);
        match self.relation {
            Relation::Eq => value == 0,
            Relation::Ne => value != 0,
            Relation::Lt => value < 0,
            Relation::Le => value <= 0,
            Relation::Gt => value > 0,
            Relation::Ge => value >= 0,
            Relation::ModEq(m) => value.rem_euclid(m) == 0,
        }
    }

    /// The negation of this constraint, normalized to `≤`/`=`/`≥` forms.
    #[must_use]
    pub fn negated(&self) -> Combiner {
        let f = &self.function;
        match self.relation {
            // ¬(f = 0)  ⇔  f ≠ 0
            Relation::Eq => AffineConstraint::new(f.clone(), Relation::Ne).normalized(),
            // ¬(f ≠ 0)  ⇔  f = 0
            Relation::Ne => Combiner::atom(AffineConstraint::new(f.clone(), Relation::Eq)),
            // ¬(f < 0)  ⇔  f ≥ 0
            Relation::Lt => Combiner::atom(AffineConstraint::new(f.clone(), Relation::Ge)),
            // ¬(f ≤ 0)  ⇔  f > 0  ⇔  f - 1 ≥ 0
            Relation::Le => Combiner::atom(AffineConstraint::new(f.plus(-1), Relation::Ge)),
            // ¬(f > 0)  ⇔  f ≤ 0
            Relation::Gt => Combiner::atom(AffineConstraint::new(f.clone(), Relation::Le)),
            // ¬(f ≥ 0)  ⇔  f < 0  ⇔  f + 1 ≤ 0
            Relation::Ge => Combiner::atom(AffineConstraint::new(f.plus(1), Relation::Le)),
            Relation::ModEq(_) => {
                panic!("negation of a stride constraint is outside the modeled fragment")
            }
        }
    }

    /// Rewrites `<`, `>` and `≠` into combinations of `≤`, `=` and `≥`,
    /// which is all downstream consumers accept.
    #[must_use]
    pub fn normalized(&self) -> Combiner {
        let f = &self.function;
        match self.relation {
            Relation::Eq | Relation::Le | Relation::Ge | Relation::ModEq(_) => {
                Combiner::atom(self.clone())
            }
            // f < 0  ⇔  f + 1 ≤ 0   (integer domain)
            Relation::Lt => Combiner::atom(AffineConstraint::new(f.plus(1), Relation::Le)),
            // f > 0  ⇔  f - 1 ≥ 0
            Relation::Gt => Combiner::atom(AffineConstraint::new(f.plus(-1), Relation::Ge)),
            // f ≠ 0  ⇔  f + 1 ≤ 0  ∨  f - 1 ≥ 0
            Relation::Ne => Combiner::atom(AffineConstraint::new(f.plus(1), Relation::Le))
                .or(Combiner::atom(AffineConstraint::new(f.plus(-1), Relation::Ge))),
        }
    }

    /// Rebases the underlying function onto a wider vector.
    #[must_use]
    pub fn to_base(&self, source: &IterationVector, target: &IterationVector) -> Self {
        Self::new(self.function.to_base(source, target), self.relation)
    }

    /// Renders the constraint over its vector.
    #[must_use]
    pub fn display<'a>(&'a self, iv: &'a IterationVector) -> impl Display + 'a {
        struct D<'a>(&'a AffineConstraint, &'a IterationVector);
        impl Display for D<'_> {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{} {} 0", self.0.function.display(self.1), self.0.relation)
            }
        }
        D(self, iv)
    }
}

/// A boolean combination of affine constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Combiner {
    /// A single constraint.
    Atom(AffineConstraint),
    /// The negation of a combination.
    Not(Box<Combiner>),
    /// The conjunction of two combinations.
    And(Box<Combiner>, Box<Combiner>),
    /// The disjunction of two combinations.
    Or(Box<Combiner>, Box<Combiner>),
}

impl Combiner {
    /// Wraps a single constraint.
    #[must_use]
    pub const fn atom(constraint: AffineConstraint) -> Self {
        Combiner::Atom(constraint)
    }

    /// The conjunction `self ∧ other`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Combiner::And(Box::new(self), Box::new(other))
    }

    /// The disjunction `self ∨ other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Combiner::Or(Box::new(self), Box::new(other))
    }

    /// The negation `¬self`.
    #[must_use]
    pub fn not(self) -> Self {
        Combiner::Not(Box::new(self))
    }

    /// Checks whether the combination holds at the given integer point.
    #[must_use]
    pub fn holds_at(&self, point: &[i64]) -> bool {
        match self {
            Combiner::Atom(c) => c.holds_at(point),
            Combiner::Not(inner) => !inner.holds_at(point),
            Combiner::And(lhs, rhs) => lhs.holds_at(point) && rhs.holds_at(point),
            Combiner::Or(lhs, rhs) => lhs.holds_at(point) || rhs.holds_at(point),
        }
    }

    /// Rebases every contained function onto a wider vector.
    #[must_use]
    pub fn to_base(&self, source: &IterationVector, target: &IterationVector) -> Self {
        match self {
            Combiner::Atom(c) => Combiner::Atom(c.to_base(source, target)),
            Combiner::Not(inner) => inner.to_base(source, target).not(),
            Combiner::And(lhs, rhs) => lhs
                .to_base(source, target)
                .and(rhs.to_base(source, target)),
            Combiner::Or(lhs, rhs) => lhs.to_base(source, target).or(rhs.to_base(source, target)),
        }
    }

    /// Converts the combination into disjunctive normal form.
    ///
    /// Negations are pushed onto the atoms and eliminated by constraint
    /// negation; every atom of the result uses `≤`, `=` or `≥`.
    #[must_use]
    pub fn to_dnf(&self) -> Dnf {
        match self {
            Combiner::Atom(c) => dnf_of(&c.normalized()),
            Combiner::Not(inner) => match inner.as_ref() {
                Combiner::Atom(c) => dnf_of(&c.negated()),
                Combiner::Not(inner) => inner.to_dnf(),
                Combiner::And(lhs, rhs) => {
                    lhs.clone().not().or(rhs.clone().not()).to_dnf()
                }
                Combiner::Or(lhs, rhs) => {
                    lhs.clone().not().and(rhs.clone().not()).to_dnf()
                }
            },
            Combiner::And(lhs, rhs) => {
                let left = lhs.to_dnf();
                let right = rhs.to_dnf();
                let mut clauses = Vec::new();
                for l in &left.clauses {
                    for r in &right.clauses {
                        let mut clause = l.clone();
                        clause.extend(r.iter().cloned());
                        clauses.push(clause);
                    }
                }
                Dnf { clauses }
            }
            Combiner::Or(lhs, rhs) => {
                let mut clauses = lhs.to_dnf().clauses;
                clauses.extend(rhs.to_dnf().clauses);
                Dnf { clauses }
            }
        }
    }
}

fn dnf_of(normalized: &Combiner) -> Dnf {
    match normalized {
        Combiner::Atom(c) => Dnf {
            clauses: vec![vec![c.clone()]],
        },
        // normalization only produces atoms and disjunctions of atoms
        Combiner::Or(lhs, rhs) => {
            let mut clauses = dnf_of(lhs).clauses;
            clauses.extend(dnf_of(rhs).clauses);
            Dnf { clauses }
        }
        _ => unreachable!("normalization yields atoms and disjunctions only"),
    }
}

/// A disjunction of conjunctions of normalized affine constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dnf {
    /// The disjuncts; each inner vector is a conjunction.
    pub clauses: Vec<Vec<AffineConstraint>>,
}

impl Dnf {
    /// Checks whether the formula holds at the given integer point.
    #[must_use]
    pub fn holds_at(&self, point: &[i64]) -> bool {
        self.clauses
            .iter()
            .any(|clause| clause.iter().all(|c| c.holds_at(point)))
    }

    /// Renders the formula over its vector.
    #[must_use]
    pub fn display<'a>(&'a self, iv: &'a IterationVector) -> impl Display + 'a {
        struct D<'a>(&'a Dnf, &'a IterationVector);
        impl Display for D<'_> {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                let rendered = self
                    .0
                    .clauses
                    .iter()
                    .map(|clause| {
                        format!("({})", clause.iter().map(|c| c.display(self.1)).join(" and "))
                    })
                    .join(" or ");
                write!(f, "{rendered}")
            }
        }
        D(self, iv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, NodeManager};

    fn single_var_iv() -> IterationVector {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let i = b.variable(int, 1);
        IterationVector::with(vec![i], vec![])
    }

    #[test]
    fn normalization_preserves_meaning() {
        let iv = single_var_iv();
        // i - 5 with every relation
        let f = AffineFunction::new(&iv, vec![1, -5]);
        for relation in [
            Relation::Eq,
            Relation::Ne,
            Relation::Lt,
            Relation::Le,
            Relation::Gt,
            Relation::Ge,
        ] {
            let c = AffineConstraint::new(f.clone(), relation);
            let n = c.normalized();
            for i in -10..10 {
                assert_eq!(c.holds_at(&[i]), n.holds_at(&[i]), "{relation} at {i}");
            }
        }
    }

    #[test]
    fn negation_complements() {
        let iv = single_var_iv();
        let f = AffineFunction::new(&iv, vec![1, -5]);
        for relation in [
            Relation::Eq,
            Relation::Ne,
            Relation::Lt,
            Relation::Le,
            Relation::Gt,
            Relation::Ge,
        ] {
            let c = AffineConstraint::new(f.clone(), relation);
            let n = c.negated();
            for i in -10..10 {
                assert_eq!(c.holds_at(&[i]), !n.holds_at(&[i]), "{relation} at {i}");
            }
        }
    }

    #[test]
    fn dnf_preserves_meaning() {
        let iv = single_var_iv();
        // (i ≥ 2 ∧ ¬(i = 5)) ∨ i > 8
        let ge2 = Combiner::atom(AffineConstraint::new(
            AffineFunction::new(&iv, vec![1, -2]),
            Relation::Ge,
        ));
        let eq5 = Combiner::atom(AffineConstraint::new(
            AffineFunction::new(&iv, vec![1, -5]),
            Relation::Eq,
        ));
        let gt8 = Combiner::atom(AffineConstraint::new(
            AffineFunction::new(&iv, vec![1, -8]),
            Relation::Gt,
        ));
        let formula = ge2.and(eq5.not()).or(gt8);
        let dnf = formula.to_dnf();

        for i in -5..20 {
            assert_eq!(formula.holds_at(&[i]), dnf.holds_at(&[i]), "at {i}");
        }
        // every atom is normalized
        for clause in &dnf.clauses {
            for atom in clause {
                assert!(matches!(
                    atom.relation,
                    Relation::Le | Relation::Eq | Relation::Ge
                ));
            }
        }
    }
}
