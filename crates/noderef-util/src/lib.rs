#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared utilities for noderef.
//!
//! Pure helpers with no logging/tracing dependencies, so the core crate can
//! decide what is worth reporting.

pub mod fs;
pub mod hash;
