// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Session state and token refresh for the secure client.
//!
//! ## Refresh Flow
//!
//! 1. A request comes back `401`
//! 2. It joins the current refresh episode (or starts one as leader)
//! 3. The leader calls the refresh endpoint once, in plaintext, without a bearer token
//! 4. Success: the new access token is stored and every queued request replays once
//! 5. Failure: the session is cleared, the user is sent to the login route and
//!    every queued request fails with `ClientError::TokenRefresh`
//!
//! ## Security
//!
//! - Tokens never appear in logs or `Debug` output
//! - A request is replayed at most once; a second `401` is surfaced

pub mod refresh;
pub mod session;

pub use refresh::{RefreshCoordinator, RefreshPhase, RefreshResult};
pub use session::{AuthTokens, LoggingSessionEvents, SessionEvents, SessionStore, TokenGrant};
