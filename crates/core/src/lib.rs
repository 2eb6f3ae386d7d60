//! Core library for scribe
//!
//! This crate implements the **Functional Core** of the scribe application,
//! following the Functional Core - Imperative Shell architectural pattern.
//!
//! # Architecture Overview
//!
//! The scribe project uses a two-crate architecture to enforce separation of
//! concerns:
//!
//! - **`scribe_core`** (this crate): Pure transformation functions with zero I/O
//! - **`scribe`**: I/O operations and orchestration (the Imperative Shell)
//!
//! All functions in this crate are pure: same input, same output, no side
//! effects. They can be tested with simple fixture data, no mocking required.
//!
//! # Module Organization
//!
//! - [`template`]: Placeholder substitution and prompt framing
//! - [`extract`]: Text extraction and truncation detection for generation
//!   API responses
//!
//! Each module contains its domain types, the transformation functions, and
//! unit tests using fixture data.

pub mod extract;
pub mod template;
