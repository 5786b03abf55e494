//! Host <-> guest value conversion.
//!
//! The helpers here are pure functions over a [`Heap`](crate::heap::Heap) view.
//! Operations that allocate live on [`Bridge`](crate::Bridge), which owns the
//! store and the runtime exports.

pub mod array;
pub mod element;
pub mod string;

pub use array::{ArrayInit, ArrayView};
pub use element::{ArrayValues, ClampedU8, Element};
