//! REST surface of the CraftX catalog.

pub mod rest;

pub use rest::{routes, RestApi};
