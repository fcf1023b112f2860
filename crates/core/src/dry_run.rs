// Dry-run interception of dangerous tool calls

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Audit record of an intercepted call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptedCall {
    pub tool: String,
    pub arguments: Value,
    pub intercepted_at: DateTime<Utc>,
}

/// Most recent intercepted calls kept for audit
pub const AUDIT_CAPACITY: usize = 100;

/// Short-circuits dangerous calls when dry-run mode is on
#[derive(Debug, Default)]
pub struct DryRunInterceptor {
    enabled: bool,
    recent: Mutex<VecDeque<InterceptedCall>>,
    total: AtomicUsize,
}

impl DryRunInterceptor {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            recent: Mutex::new(VecDeque::with_capacity(AUDIT_CAPACITY)),
            total: AtomicUsize::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn should_intercept(&self, is_dangerous: bool) -> bool {
        self.enabled && is_dangerous
    }

    /// Record the call and build the preview returned instead of executing it.
    /// `arguments` are stored as given, so callers pass them already redacted.
    pub fn intercept(&self, tool: &str, arguments: &Value) -> Value {
        {
            let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
            if recent.len() >= AUDIT_CAPACITY {
                recent.pop_front();
            }
            recent.push_back(InterceptedCall {
                tool: tool.to_string(),
                arguments: arguments.clone(),
                intercepted_at: Utc::now(),
            });
        }
        self.total.fetch_add(1, Ordering::Relaxed);

        tracing::info!(tool = %tool, "Dry-run intercepted dangerous call");

        json!({
            "dry_run": true,
            "message": format!("would have called {}", tool),
            "arguments": arguments,
            "note": "this was a dry run, no actual operation performed",
        })
    }

    /// Audit trail, oldest first
    pub fn intercepted(&self) -> Vec<InterceptedCall> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Calls intercepted since startup, including those rotated out of the audit trail
    pub fn intercepted_count(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }
}
