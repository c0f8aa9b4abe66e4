//! Abstract values of structured data.
//!
//! The store lifts a base lattice abstracting atomic values into a lattice
//! over composites (structs, unions, tuples, vectors, arrays). Three
//! representations of increasing precision are available, selected per
//! analysis; all three share one interface, so analyses are written once.
//! Every value is hash-consed by its owning [`DataManager`].

mod path;
mod value;

pub use path::{DataPath, ElementIndex, Index, IndexKind};
pub use value::{DataManager, DataValue, DataValueLattice, SECOND_ORDER_WIDTH, Variant};
