//! Default error reporter.

use crate::errors::HeraldError;
use crate::traits::ErrorReporter;

/// Sends swallowed queue failures to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &HeraldError, context: &str) {
        tracing::error!(context, error = %error, "Notification audio failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_does_not_panic_without_subscriber() {
        TracingReporter.report(&HeraldError::NoAudioPlayer, "while playing audio");
    }
}
