//! Datatype-shaped helpers that sit on top of [`crate::cell::Cell`] but
//! aren't part of the Lift protocol itself.

pub mod sequence;
