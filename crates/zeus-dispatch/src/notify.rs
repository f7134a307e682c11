// SPDX-License-Identifier: MIT OR Apache-2.0
//! Operator-facing notifications.
//!
//! The dispatcher speaks through a [`Notifier`] so the daemon can raise
//! desktop notices while embedders (the dashboard, tests) capture them
//! in process. Rate limiting lives in the dispatcher, not here.

use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Sink for block-reason notices.
pub trait Notifier {
    /// Surface one message to the operator.
    fn notify(&self, message: &str);
}

/// Sends `notify-send` desktop notifications.
///
/// A missing binary or an unresponsive notification daemon must never
/// stall a drain: the child is detached and killed after five seconds if
/// it has not exited.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, message: &str) {
        let spawned = Command::new("notify-send")
            .args([
                "--urgency=normal",
                "--app-name=zeus",
                "-i",
                "utilities-terminal",
                "zeus",
                message,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let Ok(mut child) = spawned else {
            debug!(target: "zeus.dispatch", "notify-send unavailable");
            return;
        };

        std::thread::spawn(move || {
            for _ in 0..50 {
                match child.try_wait() {
                    Ok(Some(_)) => return,
                    Ok(None) => std::thread::sleep(Duration::from_millis(100)),
                    Err(_) => return,
                }
            }
            let _ = child.kill();
            let _ = child.wait();
        });
    }
}

/// Discards every notice; for headless deployments.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _message: &str) {}
}

/// Collects notices in memory, for embedders and tests.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every notice observed so far, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, message: &str) {
        (**self).notify(message);
    }
}
