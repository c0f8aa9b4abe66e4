#![warn(
    clippy::pedantic,
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    rust_2021_compatibility
)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

//! Welcome to `vivace`, a library implementing the static analysis core of a
//! compiler framework for parallel programs.
//!
//! The crate revolves around three analyses over a high-level intermediate
//! representation:
//! - a constraint-based whole-program value analysis ([`cba`]) solving
//!   monotone set constraints ([`solver`]) over hash-consed abstract values
//!   ([`data`]),
//! - a polyhedral model ([`scop`]) describing affine loop nests ([`affine`])
//!   through an integer-set facade ([`pres`]), enabling dependence analysis
//!   and semantics-preserving loop transformations,
//! - a dataflow framework ([`dataflow`]) solving lattice problems
//!   ([`lattice`]) over an explicit control-flow graph ([`cfg`]).
//!
//! The analyzed representation itself lives in [`ir`].

pub mod affine;
pub mod cba;
pub mod cfg;
pub mod data;
pub mod dataflow;
pub mod ir;
pub mod lattice;
pub mod pres;
pub mod scop;
pub mod solver;
