use std::sync::Arc;

/// Append-only stream of operational events for operators.
pub trait Monitor: Send + Sync {
    fn send_message(&self, message: &str);
}

pub type DynMonitor = Arc<dyn Monitor>;

/// Emits audit events through `tracing` under the `audit` target.
#[derive(Default)]
pub struct LogMonitor;

impl Monitor for LogMonitor {
    fn send_message(&self, message: &str) {
        tracing::info!(target: "audit", "{}", message);
    }
}
