//! Shared plumbing for the sift schema engine.

pub mod interner;

pub use interner::{Atom, Interner};
