#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Sink for user-facing outcome messages.
pub trait Notifier {
    fn notify(&self, notice: Notice);

    fn success(&self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.notify(Notice {
            kind: NoticeKind::Success,
            message: message.into(),
        });
    }

    fn error(&self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.notify(Notice {
            kind: NoticeKind::Error,
            message: message.into(),
        });
    }
}

/// Prints successes to stdout; failures are logged and left for the caller
/// to report.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleNotifier {
    pub quiet: bool,
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        match notice.kind {
            NoticeKind::Success if !self.quiet => println!("{}", notice.message),
            NoticeKind::Success => tracing::debug!(message = %notice.message, "notice"),
            NoticeKind::Error => tracing::debug!(message = %notice.message, "error notice"),
        }
    }
}

/// Keeps every notice in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: std::cell::RefCell<Vec<Notice>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    pub fn messages(&self, kind: NoticeKind) -> Vec<String> {
        self.notices
            .borrow()
            .iter()
            .filter(|notice| notice.kind == kind)
            .map(|notice| notice.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.notices.borrow_mut().clear();
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.borrow_mut().push(notice);
    }
}
