//! The affine form algebra of the polyhedral layer.
//!
//! All symbolic loop information is expressed over an [`IterationVector`]:
//! linear [`AffineFunction`]s, [`AffineConstraint`]s and their boolean
//! [`Combiner`]s, [`IterationDomain`]s and [`AffineSystem`]s (schedules and
//! access functions). Vectors only grow; forms constructed against an older
//! layout are carried over by explicit rebasing.

mod constraint;
mod domain;
mod function;
mod iter_vec;
mod system;

pub use constraint::{AffineConstraint, Combiner, Dnf, Relation};
pub use domain::IterationDomain;
pub use function::{AffineFunction, NotAffine};
pub use iter_vec::{Element, IndexTransMap, IterationVector, merge, transform};
pub use system::AffineSystem;
