// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Colloquy integration tests.
//!
//! Provides mock adapters for fast, deterministic, CI-runnable tests
//! without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Mock inference provider with queued responses and request capture
//! - [`FaultyStore`] - Storage wrapper injecting conflicts and store failures

pub mod faulty_store;
pub mod mock_provider;

pub use faulty_store::FaultyStore;
pub use mock_provider::MockProvider;
