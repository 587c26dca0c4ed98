//! Notices, the stock notifier/navigator implementations, and the mapping
//! from request failures to user-visible effects.

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::error::{Action, ApiError, ErrorKind};
use crate::traits::{Navigator, Notifier};

/// Shown when the backend rejects the session.
pub const SESSION_EXPIRED: &str = "Sesión expirada, ingrese nuevamente";

/// Placeholder shown for conflicts until their handling is defined.
pub const CONFLICT_PENDING: &str = "Conflicto al procesar la solicitud (pendiente)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self { level, message: message.into() }
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success | NoticeLevel::Info => info!(message = %notice.message, "notice"),
            NoticeLevel::Warning => warn!(message = %notice.message, "notice"),
            NoticeLevel::Error => error!(message = %notice.message, "notice"),
        }
    }
}

/// Collects notices in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the collected notices.
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

/// Navigator for contexts without a router (the CLI).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn set_record_param(&self, _record_id: Option<&str>) {}

    fn force_logout(&self) {
        warn!("session rejected by the backend");
    }
}

/// Records navigation side effects.
#[derive(Debug, Default)]
pub struct MemoryNavigator {
    record_param: Mutex<Option<String>>,
    logouts: Mutex<usize>,
}

impl MemoryNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn record_param(&self) -> Option<String> {
        self.record_param.lock().clone()
    }

    #[must_use]
    pub fn logouts(&self) -> usize {
        *self.logouts.lock()
    }
}

impl Navigator for MemoryNavigator {
    fn set_record_param(&self, record_id: Option<&str>) {
        *self.record_param.lock() = record_id.map(str::to_string);
    }

    fn force_logout(&self) {
        *self.logouts.lock() += 1;
    }
}

/// Surfaces a failed request: logout on an unauthorized response, a
/// placeholder on conflict, the generic failure message otherwise. Nothing
/// is retried.
pub fn report_failure(
    notifier: &dyn Notifier,
    navigator: &dyn Navigator,
    action: Action,
    err: &ApiError,
) {
    warn!(action = action.as_str(), error = %err, "request failed");
    match err.kind() {
        ErrorKind::Unauthorized => {
            notifier.notify(Notice::error(SESSION_EXPIRED));
            navigator.force_logout();
        }
        ErrorKind::Conflict => {
            notifier.notify(Notice::new(NoticeLevel::Warning, CONFLICT_PENDING));
        }
        ErrorKind::Failed => notifier.notify(Notice::error(action.failure_message())),
    }
}
