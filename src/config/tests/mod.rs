//! Unit tests for carina configuration types.
//!
//! This module contains tests organised into:
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Defaults, serialisation and path derivation
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence tests

mod helpers;
