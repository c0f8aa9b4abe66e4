//! Affine systems: ordered lists of functions over one vector.

use std::fmt::{self, Display, Formatter};

use super::function::AffineFunction;
use super::iter_vec::IterationVector;

/// An ordered list of [`AffineFunction`]s sharing one iteration vector.
///
/// Systems represent schedules and access functions. Every row references
/// the system's vector; rebasing the system onto a wider vector rewrites
/// all rows through the corresponding index translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffineSystem {
    iv: IterationVector,
    rows: Vec<AffineFunction>,
}

impl AffineSystem {
    /// Creates an empty system over the given vector.
    #[must_use]
    pub const fn new(iv: IterationVector) -> Self {
        Self {
            iv,
            rows: Vec::new(),
        }
    }

    /// Creates a system from coefficient rows.
    #[must_use]
    pub fn from_rows(iv: IterationVector, rows: &[Vec<i64>]) -> Self {
        let mut system = Self::new(iv);
        for row in rows {
            system.append_coeffs(row.clone());
        }
        system
    }

    /// A copy of `other` with all rows rebased onto the wider vector `iv`.
    ///
    /// # Panics
    /// Panics if `iv` does not cover the vector of `other`.
    #[must_use]
    pub fn rebased(iv: IterationVector, other: &Self) -> Self {
        let rows = other
            .rows
            .iter()
            .map(|f| f.to_base(&other.iv, &iv))
            .collect();
        Self { iv, rows }
    }

    /// The shared iteration vector.
    #[must_use]
    pub const fn iteration_vector(&self) -> &IterationVector {
        &self.iv
    }

    /// Appends a function as the last row.
    ///
    /// # Panics
    /// Panics if the function's layout does not match the vector.
    pub fn append(&mut self, function: AffineFunction) {
        assert_eq!(
            function.size(),
            self.iv.size(),
            "row layout does not match the iteration vector"
        );
        self.rows.push(function);
    }

    /// Appends a row built from coefficients.
    pub fn append_coeffs(&mut self, coeffs: Vec<i64>) {
        let function = AffineFunction::new(&self.iv, coeffs);
        self.append(function);
    }

    /// Inserts a function before position `pos`.
    ///
    /// # Panics
    /// Panics if `pos` is beyond the row count or the layout mismatches.
    pub fn insert(&mut self, pos: usize, function: AffineFunction) {
        assert_eq!(
            function.size(),
            self.iv.size(),
            "row layout does not match the iteration vector"
        );
        self.rows.insert(pos, function);
    }

    /// Removes the row at the given position.
    pub fn remove(&mut self, pos: usize) {
        self.rows.remove(pos);
    }

    /// The number of rows.
    #[must_use]
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Checks whether the system has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row at the given position.
    #[must_use]
    pub fn row(&self, pos: usize) -> &AffineFunction {
        &self.rows[pos]
    }

    /// Mutable access to the row at the given position.
    #[must_use]
    pub fn row_mut(&mut self, pos: usize) -> &mut AffineFunction {
        &mut self.rows[pos]
    }

    /// Iterates over the rows in order.
    pub fn iter(&self) -> impl Iterator<Item = &AffineFunction> {
        self.rows.iter()
    }

    /// Swaps two rows.
    pub fn swap(&mut self, a: usize, b: usize) {
        self.rows.swap(a, b);
    }

    /// Evaluates all rows at the given integer point.
    #[must_use]
    pub fn eval(&self, point: &[i64]) -> Vec<i64> {
        self.rows.iter().map(|f| f.eval(point)).collect()
    }
}

impl Display for AffineSystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(f, "{}", row.display(&self.iv))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, NodeManager};

    #[test]
    fn rebasing_rewrites_all_rows() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let i = b.variable(int, 1);
        let j = b.variable(int, 2);

        let narrow = IterationVector::with(vec![i], vec![]);
        let wide = IterationVector::with(vec![j, i], vec![]);

        let sys = AffineSystem::from_rows(narrow.clone(), &[vec![1, 0], vec![2, 5]]);
        let rebased = AffineSystem::rebased(wide.clone(), &sys);

        assert_eq!(rebased.size(), 2);
        for (row, rebased_row) in sys.iter().zip(rebased.iter()) {
            assert_eq!(row.eval(&[7]), rebased_row.eval(&[100, 7]));
        }
    }

    #[test]
    #[should_panic(expected = "does not match the iteration vector")]
    fn foreign_row_is_rejected() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let i = b.variable(int, 1);
        let j = b.variable(int, 2);

        let one = IterationVector::with(vec![i], vec![]);
        let two = IterationVector::with(vec![i, j], vec![]);
        let foreign = AffineFunction::new(&two, vec![1, 1, 0]);

        let mut sys = AffineSystem::new(one);
        sys.append(foreign);
    }
}
