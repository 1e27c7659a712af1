use crossbeam_channel::{unbounded, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// A transient message for the user, shown once and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

/// Queue of user-facing notices; stores push, the front end drains.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Sender<Notification>,
    rx: Receiver<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Level::Info, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Level::Error, message.into());
    }

    fn push(&self, level: Level, message: String) {
        // the receiver lives in self, so the channel cannot be disconnected
        let _ = self.tx.send(Notification { level, message });
    }

    pub fn drain(&self) -> Vec<Notification> {
        self.rx.try_iter().collect()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_queue_in_order() {
        let notifier = Notifier::new();
        notifier.info("saved");
        notifier.clone().error("failed");
        let drained = notifier.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].level, Level::Info);
        assert_eq!(drained[1].message, "failed");
        assert!(notifier.drain().is_empty());
    }
}
