// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User-visible notifications.
//!
//! The portals render these as toasts. The client only decides *what* to
//! say; rendering belongs to whoever implements [`Notifier`].

use tracing::{error, info, warn};

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message destined for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// Transient errors can be dismissed; a forced logout cannot.
    pub dismissible: bool,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            dismissible: true,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
            dismissible: true,
        }
    }

    /// Non-dismissible notice shown right before a forced redirect.
    pub fn blocking(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            dismissible: false,
        }
    }
}

/// Sink for user-visible notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default notifier for headless use: notices become log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => info!(dismissible = notice.dismissible, "{}", notice.message),
            NoticeLevel::Warning => warn!(dismissible = notice.dismissible, "{}", notice.message),
            NoticeLevel::Error => error!(dismissible = notice.dismissible, "{}", notice.message),
        }
    }
}
