//! Affine functions over iteration vectors.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::ir::lang::{Basic, Op};
use crate::ir::{Node, NodeId, NodeManager};

use super::iter_vec::{Element, IterationVector, transform};

/// An IR expression could not be modeled as a linear form.
///
/// Raised by [`AffineFunction::from_expr`]; the SCoP extractor catches it
/// and conservatively abandons the region.
#[derive(Debug, Clone, thiserror::Error)]
#[error("expression is not affine: {reason}")]
pub struct NotAffine {
    /// Why the expression falls outside the affine fragment.
    pub reason: String,
}

impl NotAffine {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// An integer-coefficient linear form over an [`IterationVector`].
///
/// Coefficients follow the vector's layout `iterators ++ parameters ++
/// constant`. The function additionally records the iterator count of the
/// vector at construction time, which allows re-interpreting the
/// coefficients after the vector has grown by appended elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffineFunction {
    coeffs: Vec<i64>,
    sep: usize,
}

impl AffineFunction {
    /// Creates the function with the given coefficients over `iv`.
    ///
    /// A shorter coefficient list is padded with zeros.
    ///
    /// # Panics
    /// Panics if more coefficients than positions are supplied.
    #[must_use]
    pub fn new(iv: &IterationVector, coeffs: impl Into<Vec<i64>>) -> Self {
        let mut coeffs = coeffs.into();
        assert!(
            coeffs.len() <= iv.size(),
            "coefficient list longer than the iteration vector"
        );
        coeffs.resize(iv.size(), 0);
        Self {
            coeffs,
            sep: iv.iter_count(),
        }
    }

    /// The constant function with the given value.
    #[must_use]
    pub fn constant(iv: &IterationVector, value: i64) -> Self {
        let mut result = Self::new(iv, vec![0; iv.size()]);
        *result.coeffs.last_mut().expect("vector has a constant position") = value;
        result
    }

    /// The function selecting a single element with coefficient one.
    ///
    /// # Panics
    /// Panics if the element is not part of the vector.
    #[must_use]
    pub fn selecting(iv: &IterationVector, element: &Element) -> Self {
        let mut result = Self::new(iv, vec![0; iv.size()]);
        let pos = iv
            .index_of(element)
            .expect("selected element not part of the iteration vector");
        result.coeffs[pos] = 1;
        result
    }

    /// The number of coefficient positions.
    #[must_use]
    pub fn size(&self) -> usize {
        self.coeffs.len()
    }

    /// The iterator count of the vector at construction time.
    #[must_use]
    pub const fn separator(&self) -> usize {
        self.sep
    }

    /// The coefficient at the given position.
    #[must_use]
    pub fn coeff(&self, pos: usize) -> i64 {
        self.coeffs[pos]
    }

    /// Sets the coefficient at the given position.
    pub fn set_coeff(&mut self, pos: usize, value: i64) {
        self.coeffs[pos] = value;
    }

    /// The coefficient of the given element of `iv`.
    ///
    /// # Panics
    /// Panics if the element is not part of the vector.
    #[must_use]
    pub fn coeff_of(&self, iv: &IterationVector, element: &Element) -> i64 {
        let pos = iv
            .index_of(element)
            .expect("element not part of the iteration vector");
        self.coeffs[pos]
    }

    /// The constant term.
    #[must_use]
    pub fn constant_term(&self) -> i64 {
        *self.coeffs.last().expect("function has a constant position")
    }

    /// Checks whether all non-constant coefficients vanish.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.coeffs[..self.coeffs.len() - 1].iter().all(|&c| c == 0)
    }

    /// Evaluates the function at an integer point covering all iterators and
    /// parameters of the vector.
    ///
    /// # Panics
    /// Panics if the point's arity does not match the vector.
    #[must_use]
    pub fn eval(&self, point: &[i64]) -> i64 {
        assert_eq!(
            point.len(),
            self.coeffs.len() - 1,
            "point arity does not match the iteration vector"
        );
        self.coeffs[..self.coeffs.len() - 1]
            .iter()
            .zip(point)
            .map(|(&c, &x)| c * x)
            .sum::<i64>()
            + self.constant_term()
    }

    /// The pointwise negation of this function.
    #[must_use]
    pub fn negated(&self) -> Self {
        Self {
            coeffs: self.coeffs.iter().map(|&c| -c).collect(),
            sep: self.sep,
        }
    }

    /// The pointwise sum with a constant.
    #[must_use]
    pub fn plus(&self, value: i64) -> Self {
        let mut result = self.clone();
        *result.coeffs.last_mut().expect("function has a constant position") += value;
        result
    }

    /// Rewrites this function over `source` into an equivalent function over
    /// the wider vector `target`.
    ///
    /// # Panics
    /// Panics if `target` does not cover `source`; rebasing onto a narrower
    /// vector indicates a caller bug.
    #[must_use]
    pub fn to_base(&self, source: &IterationVector, target: &IterationVector) -> Self {
        let map = transform(target, source);
        let mut coeffs = vec![0; target.size()];
        for (pos, &coeff) in self.coeffs.iter().enumerate() {
            coeffs[map[pos]] = coeff;
        }
        Self {
            coeffs,
            sep: target.iter_count(),
        }
    }

    /// Re-interprets the coefficients against `iv` after the vector has
    /// grown by appended iterators and parameters.
    ///
    /// The construction-time separator locates the old iterator/parameter
    /// boundary inside the stored coefficients.
    #[must_use]
    pub fn widened_to(&self, iv: &IterationVector) -> Self {
        assert!(
            iv.iter_count() >= self.sep && iv.size() >= self.size(),
            "iteration vector shrunk below the function's layout"
        );
        let old_params = self.size() - self.sep - 1;
        let mut coeffs = vec![0; iv.size()];
        coeffs[..self.sep].copy_from_slice(&self.coeffs[..self.sep]);
        coeffs[iv.iter_count()..iv.iter_count() + old_params]
            .copy_from_slice(&self.coeffs[self.sep..self.sep + old_params]);
        *coeffs.last_mut().expect("vector has a constant position") = self.constant_term();
        Self {
            coeffs,
            sep: iv.iter_count(),
        }
    }

    /// Converts an IR expression into an affine function over `iv`.
    ///
    /// Succeeds exactly when the expression is a linear form over program
    /// variables; variables not yet part of the vector are appended as
    /// parameters.
    ///
    /// # Errors
    /// Returns [`NotAffine`] for any non-linear expression.
    pub fn from_expr(
        mgr: &NodeManager,
        basic: &Basic,
        iv: &mut IterationVector,
        expr: NodeId,
    ) -> Result<Self, NotAffine> {
        let form = LinearForm::of(mgr, basic, expr)?;
        for &var in form.terms.keys() {
            if !iv.contains_iterator(var) && !iv.contains_parameter(var) {
                iv.add_parameter(var);
            }
        }
        let mut result = Self::constant(iv, form.constant);
        for (var, coeff) in form.terms {
            let element = if iv.contains_iterator(var) {
                Element::Iterator(var)
            } else {
                Element::Parameter(var)
            };
            let pos = iv.index_of(&element).expect("variable was just added");
            result.coeffs[pos] = coeff;
        }
        Ok(result)
    }

    /// Renders the function over its vector, e.g. `2*v1 + v3 - 5`.
    #[must_use]
    pub fn display<'a>(&'a self, iv: &'a IterationVector) -> impl Display + 'a {
        DisplayFn { f: self, iv }
    }
}

struct DisplayFn<'a> {
    f: &'a AffineFunction,
    iv: &'a IterationVector,
}

impl Display for DisplayFn<'_> {
    fn fmt(&self, out: &mut Formatter<'_>) -> fmt::Result {
        let terms = (0..self.f.size())
            .filter(|&pos| self.f.coeff(pos) != 0)
            .map(|pos| match self.iv.element(pos) {
                Element::Iterator(v) | Element::Parameter(v) => {
                    format!("{}*{v}", self.f.coeff(pos))
                }
                Element::Constant => format!("{}", self.f.coeff(pos)),
            })
            .join(" + ");
        if terms.is_empty() {
            write!(out, "0")
        } else {
            write!(out, "{terms}")
        }
    }
}

/// A linear combination of variables plus a constant.
struct LinearForm {
    terms: BTreeMap<NodeId, i64>,
    constant: i64,
}

impl LinearForm {
    fn constant(value: i64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    fn variable(var: NodeId) -> Self {
        Self {
            terms: BTreeMap::from([(var, 1)]),
            constant: 0,
        }
    }

    fn as_constant(&self) -> Option<i64> {
        self.terms.is_empty().then_some(self.constant)
    }

    fn combine(mut self, other: Self, factor: i64) -> Self {
        for (var, coeff) in other.terms {
            *self.terms.entry(var).or_insert(0) += factor * coeff;
        }
        self.constant += factor * other.constant;
        self.terms.retain(|_, coeff| *coeff != 0);
        self
    }

    fn scaled(self, factor: i64) -> Self {
        Self::constant(0).combine(self, factor)
    }

    fn of(mgr: &NodeManager, basic: &Basic, expr: NodeId) -> Result<Self, NotAffine> {
        match mgr.node(expr) {
            Node::Literal { .. } => mgr
                .int_value(expr)
                .map(Self::constant)
                .ok_or_else(|| NotAffine::new("literal is not an integer")),
            Node::Variable { .. } => Ok(Self::variable(expr)),
            Node::Call { callee, args, .. } => {
                let op = basic
                    .op_of(mgr, *callee)
                    .ok_or_else(|| NotAffine::new("call of a non-arithmetic function"))?;
                match op {
                    // a load from a plain variable reference is treated as
                    // the variable's current value
                    Op::RefDeref => match args[..] {
                        [arg] if matches!(mgr.node(arg), Node::Variable { .. }) => {
                            Ok(Self::variable(arg))
                        }
                        _ => Err(NotAffine::new("load from a non-variable reference")),
                    },
                    Op::IntAdd | Op::IntSub => {
                        let [lhs, rhs] = args[..] else {
                            return Err(NotAffine::new("malformed arithmetic call"));
                        };
                        let lhs = Self::of(mgr, basic, lhs)?;
                        let rhs = Self::of(mgr, basic, rhs)?;
                        let factor = if op == Op::IntAdd { 1 } else { -1 };
                        Ok(lhs.combine(rhs, factor))
                    }
                    Op::IntMul => {
                        let [lhs, rhs] = args[..] else {
                            return Err(NotAffine::new("malformed arithmetic call"));
                        };
                        let lhs = Self::of(mgr, basic, lhs)?;
                        let rhs = Self::of(mgr, basic, rhs)?;
                        if let Some(value) = lhs.as_constant() {
                            Ok(rhs.scaled(value))
                        } else if let Some(value) = rhs.as_constant() {
                            Ok(lhs.scaled(value))
                        } else {
                            Err(NotAffine::new("product of two non-constant forms"))
                        }
                    }
                    _ => Err(NotAffine::new(format!(
                        "operator `{}` outside the affine fragment",
                        op.name()
                    ))),
                }
            }
            _ => Err(NotAffine::new("expression is not an arithmetic form")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Builder;

    #[test]
    fn evaluation_matches_coefficients() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let i = b.variable(int, 1);
        let n = b.variable(int, 2);
        let iv = IterationVector::with(vec![i], vec![n]);

        let f = AffineFunction::new(&iv, vec![2, 3, -1]);
        assert_eq!(f.eval(&[5, 7]), 2 * 5 + 3 * 7 - 1);
    }

    #[test]
    fn rebasing_preserves_evaluation() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let i = b.variable(int, 1);
        let j = b.variable(int, 2);
        let n = b.variable(int, 3);

        let narrow = IterationVector::with(vec![i], vec![n]);
        let wide = IterationVector::with(vec![j, i], vec![n]);

        let f = AffineFunction::new(&narrow, vec![4, 2, 9]);
        let g = f.to_base(&narrow, &wide);

        // common points: i = 3, n = 5; j free
        assert_eq!(f.eval(&[3, 5]), g.eval(&[11, 3, 5]));
        assert_eq!(f.eval(&[3, 5]), g.eval(&[-2, 3, 5]));
    }

    #[test]
    fn widening_follows_the_separator() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let i = b.variable(int, 1);
        let n = b.variable(int, 2);
        let j = b.variable(int, 3);

        let mut iv = IterationVector::with(vec![i], vec![n]);
        let f = AffineFunction::new(&iv, vec![2, 3, 7]);

        // the vector grows after construction
        iv.add_iterator(j);
        let g = f.widened_to(&iv);
        assert_eq!(g.size(), iv.size());
        assert_eq!(g.coeff_of(&iv, &Element::Iterator(i)), 2);
        assert_eq!(g.coeff_of(&iv, &Element::Iterator(j)), 0);
        assert_eq!(g.coeff_of(&iv, &Element::Parameter(n)), 3);
        assert_eq!(g.constant_term(), 7);
    }

    #[test]
    fn conversion_accepts_linear_forms() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let basic = b.basic();
        let int = basic.int;
        let i = b.variable(int, 1);
        let n = b.variable(int, 2);
        let two = b.int_lit(2);
        let five = b.int_lit(5);
        // 2*i + (n - 5)
        let lhs = b.mul(two, i);
        let rhs = b.sub(n, five);
        let sum = b.add(lhs, rhs);

        let mut iv = IterationVector::with(vec![i], vec![]);
        let f = AffineFunction::from_expr(&mgr, &basic, &mut iv, sum).expect("affine");

        // n was auto-added as a parameter
        assert!(iv.contains_parameter(n));
        assert_eq!(f.coeff_of(&iv, &Element::Iterator(i)), 2);
        assert_eq!(f.coeff_of(&iv, &Element::Parameter(n)), 1);
        assert_eq!(f.constant_term(), -5);
    }

    #[test]
    fn conversion_rejects_nonlinear_forms() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let basic = b.basic();
        let int = basic.int;
        let i = b.variable(int, 1);
        let j = b.variable(int, 2);
        let product = b.mul(i, j);

        let mut iv = IterationVector::new();
        let result = AffineFunction::from_expr(&mgr, &basic, &mut iv, product);
        assert!(result.is_err());
    }
}
