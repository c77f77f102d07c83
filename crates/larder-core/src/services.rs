//! Collaborator interfaces injected by the host application.

use crate::error::LarderError;

/// Warms an image cache ahead of display.
///
/// Fire-and-forget: implementations swallow their own failures.
pub trait ImagePreloader: Send + Sync {
    fn preload(&self, urls: &[String]);
}

/// User-visible feedback channel (toasts, banners).
pub trait Notifier: Send + Sync {
    /// A mutation completed and the user should be told.
    fn success(&self, message: &str);

    /// A mutation failed and was rolled back.
    fn error(&self, action: &str, error: &LarderError);
}

/// Preloader that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPreloader;

impl ImagePreloader for NoopPreloader {
    fn preload(&self, _urls: &[String]) {}
}

/// Notifier that only writes log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, message: &str) {
        tracing::info!(message, "mutation succeeded");
    }

    fn error(&self, action: &str, error: &LarderError) {
        tracing::warn!(action, %error, "mutation failed");
    }
}
