// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP front end for Colloquy.
//!
//! A thin axum layer over [`ConversationService`](colloquy_session::ConversationService):
//! it decodes the request, runs the ask flow, and maps error classes to
//! status codes.

pub mod handlers;
pub mod server;

pub use handlers::{ApiError, AskRequest, AskResponse, ErrorResponse};
pub use server::{GatewayState, router, serve};
