// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for inference backends.

use async_trait::async_trait;

use crate::error::ColloquyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::Message;

/// Adapter for the inference collaborator.
///
/// Providers see only the ordered transcript they are handed; they have no
/// access to the store. Calls may take seconds.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Generates the next assistant reply for `transcript`.
    async fn complete(&self, transcript: &[Message]) -> Result<String, ColloquyError>;
}
