// Per-call invocation pipeline
//
// Order: lookup, credential injection, dry-run short circuit, rate limit, cache,
// execution (paginated or plain, with retries), cache store, redaction.

use crate::auth::{CredentialInjector, NoCredentials};
use crate::cache::{CacheKey, CacheStats, ResultCache};
use crate::catalog::{Tool, ToolCatalog};
use crate::config::ServerConfig;
use crate::descriptor::Operation;
use crate::dry_run::{DryRunInterceptor, InterceptedCall};
use crate::error::{InvocationError, OperationError};
use crate::executor::{Executor, ExecutorStats, RetryPolicy};
use crate::metrics::{labels, MetricsCollector, MetricsSink};
use crate::pagination::{
    apply_default_limit, extract_next_cursor, truncate_page, PageCollector,
};
use crate::rate_limit::{RateLimitStats, RateLimiter};
use crate::redact::redact;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one tool call as reported to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,
    pub cached: bool,
    pub duration_ms: f64,
    pub dry_run: bool,
    pub truncated: bool,
    pub attempts: u32,
}

impl ExecutionResult {
    fn success(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            cached: false,
            duration_ms: 0.0,
            dry_run: false,
            truncated: false,
            attempts: 0,
        }
    }

    fn failure(error: InvocationError) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            cached: false,
            duration_ms: 0.0,
            dry_run: false,
            truncated: false,
            attempts: 0,
        }
    }

    pub fn into_result(self) -> Result<Value, InvocationError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// Per-call switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    pub use_cache: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DryRunStats {
    pub enabled: bool,
    pub intercepted: usize,
    /// Audit trail of the latest intercepted calls
    pub recent: Vec<InterceptedCall>,
}

/// Snapshot of the engine's collaborators for `server/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub executor: ExecutorStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiter: Option<RateLimitStats>,
    pub dry_run: DryRunStats,
}

/// Runs tool calls against a catalog
pub struct InvocationEngine {
    catalog: Arc<ToolCatalog>,
    executor: Executor,
    credentials: Arc<dyn CredentialInjector>,
    dry_run: DryRunInterceptor,
    cache: Option<ResultCache>,
    rate_limiter: Option<RateLimiter>,
    metrics: Arc<dyn MetricsSink>,
    redact_secrets: bool,
    max_items: usize,
    collect_all_pages: bool,
}

impl InvocationEngine {
    pub fn new(catalog: Arc<ToolCatalog>, config: &ServerConfig) -> Self {
        let cache = config.enable_cache.then(|| {
            info!(
                ttl = config.cache_ttl,
                max_entries = config.cache_max_entries,
                "Cache enabled"
            );
            ResultCache::new(config.cache_ttl(), config.cache_max_entries)
        });
        let rate_limiter = config.enable_rate_limit.then(|| {
            info!(
                max_calls = config.rate_limit_calls,
                window = config.rate_limit_window,
                "Rate limiting enabled"
            );
            RateLimiter::new(config.rate_limit_calls, config.rate_limit_window())
        });
        if config.dry_run {
            info!("Dry-run mode enabled");
        }

        Self {
            catalog,
            executor: Executor::new(RetryPolicy::from_config(config)),
            credentials: Arc::new(NoCredentials),
            dry_run: DryRunInterceptor::new(config.dry_run),
            cache,
            rate_limiter,
            metrics: Arc::new(MetricsCollector::new()),
            redact_secrets: config.redact_secrets,
            max_items: config.max_pagination_items,
            collect_all_pages: config.collect_all_pages,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialInjector>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.rate_limiter.as_ref()
    }

    pub fn dry_run(&self) -> &DryRunInterceptor {
        &self.dry_run
    }

    pub fn redacts_secrets(&self) -> bool {
        self.redact_secrets
    }

    /// Clear the result cache; false when caching is disabled
    pub fn clear_cache(&self) -> bool {
        match &self.cache {
            Some(cache) => {
                cache.clear();
                info!("Cache cleared");
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            executor: self.executor.stats(),
            cache: self.cache.as_ref().map(ResultCache::stats),
            rate_limiter: self.rate_limiter.as_ref().map(RateLimiter::stats),
            dry_run: DryRunStats {
                enabled: self.dry_run.is_enabled(),
                intercepted: self.dry_run.intercepted_count(),
                recent: self.dry_run.intercepted(),
            },
        }
    }

    /// Run one tool call through the full pipeline
    pub async fn call(&self, name: &str, arguments: Value, options: CallOptions) -> ExecutionResult {
        let tool_labels = labels(&[("tool", name)]);
        self.metrics.increment_counter("tool.calls", tool_labels.clone());

        let outcome = self.run(name, arguments, options).await;

        if !outcome.success {
            self.metrics.increment_counter("tool.errors", tool_labels.clone());
        }
        self.metrics
            .observe_histogram("tool.duration_ms", outcome.duration_ms, tool_labels);

        debug!(
            tool = %name,
            success = outcome.success,
            cached = outcome.cached,
            duration_ms = outcome.duration_ms,
            "Tool call finished"
        );
        outcome
    }

    async fn run(&self, name: &str, arguments: Value, options: CallOptions) -> ExecutionResult {
        let Some((tool, operation)) = self.catalog.entry(name) else {
            return ExecutionResult::failure(InvocationError::not_found(name));
        };
        let tool_labels = labels(&[("tool", name)]);

        if !(arguments.is_object() || arguments.is_null()) {
            return ExecutionResult::failure(InvocationError::invalid_request(
                "arguments must be an object",
            ));
        }
        let arguments = Value::Object(into_object(arguments));
        let cache_key = CacheKey::for_call(name, &arguments);
        let injected = self.credentials.inject(&tool.metadata.namespace, arguments);

        if self.dry_run.should_intercept(tool.metadata.is_dangerous) {
            self.metrics
                .increment_counter("tool.dry_run_intercepted", tool_labels);
            let preview = self.dry_run.intercept(name, &self.redacted(injected));
            let mut result = ExecutionResult::success(preview);
            result.dry_run = true;
            return result;
        }

        if let Some(limiter) = &self.rate_limiter {
            if let Err(retry_after) = limiter.check(name) {
                warn!(
                    tool = %name,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limit exceeded"
                );
                self.metrics.increment_counter("tool.rate_limited", tool_labels);
                return ExecutionResult::failure(InvocationError::rate_limited(name));
            }
        }

        let cache = self.cache.as_ref().filter(|_| options.use_cache);
        if let Some(cache) = cache {
            if let Some(value) = cache.get(&cache_key) {
                self.metrics.increment_counter("tool.cache_hits", tool_labels);
                let mut result = ExecutionResult::success(self.redacted(value));
                result.cached = true;
                return result;
            }
            self.metrics
                .increment_counter("tool.cache_misses", tool_labels.clone());
        }

        // Only execution is timed; short-circuited calls report zero
        let started = Instant::now();
        let (outcome, attempts, truncated) = if tool.metadata.has_pagination {
            self.run_paginated(tool, operation, into_object(injected)).await
        } else {
            let execution = self.executor.execute(operation, &injected).await;
            (execution.outcome, execution.attempts, false)
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut result = match outcome {
            Ok(value) => {
                if let Some(cache) = cache {
                    cache.set(cache_key, value.clone());
                }
                let mut result = ExecutionResult::success(self.redacted(value));
                result.truncated = truncated;
                result
            }
            Err(e) => {
                warn!(tool = %name, error = %e, error_type = %e.type_name, "Tool execution failed");
                ExecutionResult::failure(e.into())
            }
        };
        result.attempts = attempts;
        result.duration_ms = duration_ms;
        result
    }

    async fn run_paginated(
        &self,
        tool: &Tool,
        operation: &Operation,
        mut arguments: Map<String, Value>,
    ) -> (Result<Value, OperationError>, u32, bool) {
        let info = &tool.metadata.pagination;
        apply_default_limit(&mut arguments, info, self.max_items);

        if !self.collect_all_pages {
            let execution = self
                .executor
                .execute(operation, &Value::Object(arguments))
                .await;
            return match execution.outcome {
                Ok(page) => {
                    let (page, truncated) = truncate_page(page, self.max_items);
                    (Ok(page), execution.attempts, truncated)
                }
                Err(e) => (Err(e), execution.attempts, false),
            };
        }

        let mut collector = PageCollector::new(self.max_items);
        let mut attempts = 0;

        while collector.wants_more() {
            let execution = self
                .executor
                .execute(operation, &Value::Object(arguments.clone()))
                .await;
            attempts += execution.attempts;

            let page = match execution.outcome {
                Ok(page) => page,
                Err(e) if collector.pages() == 0 => return (Err(e), attempts, false),
                Err(e) => {
                    warn!(
                        tool = %tool.name,
                        pages = collector.pages(),
                        error = %e,
                        "Pagination failed, returning collected items"
                    );
                    break;
                }
            };

            if collector.push_page(&page) == 0 {
                break;
            }
            let (Some(cursor_param), Some(next)) = (&info.cursor_param, extract_next_cursor(&page))
            else {
                break;
            };
            arguments.insert(cursor_param.clone(), next);
        }

        let (collected, truncated) = collector.finish();
        (Ok(collected), attempts, truncated)
    }

    fn redacted(&self, value: Value) -> Value {
        if self.redact_secrets {
            redact(&value)
        } else {
            value
        }
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthManager, TokenProvider, TokenSource};
    use crate::catalog::CatalogBuilder;
    use crate::descriptor::{AsyncOperation, MethodDescriptor, Parameter, StaticSource};
    use crate::error::ErrorKind;
    use crate::metrics::Labels;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Fixture {
        deletes: Arc<AtomicU32>,
        reads: Arc<AtomicU32>,
    }

    fn source(fixture: &Fixture) -> StaticSource {
        let deletes = fixture.deletes.clone();
        let reads = fixture.reads.clone();

        StaticSource::new()
            .with(
                "fs",
                MethodDescriptor::new("fs.read_file").param(Parameter::typed("path", "str")),
                Operation::direct(move |args| {
                    reads.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"path": args["path"], "content": "hello", "api_key": "k-123"}))
                }),
            )
            .with(
                "fs",
                MethodDescriptor::new("fs.delete_file").param(Parameter::typed("path", "str")),
                Operation::direct(move |_| {
                    deletes.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"deleted": true}))
                }),
            )
            .with(
                "fs",
                MethodDescriptor::new("fs.stat").param(Parameter::typed("path", "str")),
                Operation::direct(|_| Err(OperationError::new("FileNotFoundError", "no such file"))),
            )
            .with(
                "fs",
                MethodDescriptor::new("fs.list_entries")
                    .param(Parameter::typed("limit", "int").with_default(10)),
                Operation::direct(|args| {
                    let limit = args["limit"].as_u64().unwrap_or(0);
                    Ok(json!({"items": (0..limit).collect::<Vec<_>>()}))
                }),
            )
            .with(
                "fs",
                MethodDescriptor::new("fs.scan_pages")
                    .param(Parameter::typed("cursor", "int").with_default(Value::Null)),
                Operation::direct(|args| {
                    let page = args["cursor"].as_u64().unwrap_or(0);
                    match page {
                        0 | 1 => Ok(json!({
                            "items": (page * 10..page * 10 + 10).collect::<Vec<_>>(),
                            "next_cursor": page + 1,
                        })),
                        2 => Ok(json!({"items": [20, 21, 22]})),
                        _ => Err(OperationError::message("unreachable page")),
                    }
                }),
            )
            .with(
                "fs",
                MethodDescriptor::new("fs.walk_pages")
                    .param(Parameter::typed("cursor", "int").with_default(Value::Null)),
                Operation::direct(|args| {
                    if args["cursor"].is_null() {
                        Ok(json!({"items": [1, 2, 3], "next": "p2"}))
                    } else {
                        Err(OperationError::message("invalid cursor"))
                    }
                }),
            )
    }

    async fn engine_with(config: ServerConfig) -> (InvocationEngine, Fixture) {
        let fixture = Fixture {
            deletes: Arc::new(AtomicU32::new(0)),
            reads: Arc::new(AtomicU32::new(0)),
        };
        let catalog = CatalogBuilder::new()
            .allow_dangerous(true)
            .build(&source(&fixture), &["fs".to_string()])
            .await;
        (InvocationEngine::new(Arc::new(catalog), &config), fixture)
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (engine, _) = engine_with(ServerConfig::default()).await;
        let result = engine.call("fs.nope", json!({}), CallOptions::default()).await;

        assert!(!result.success);
        let err = result.error.unwrap();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "tool not found: fs.nope");
    }

    #[tokio::test]
    async fn test_success_is_redacted() {
        let (engine, fixture) = engine_with(ServerConfig::default()).await;
        let result = engine
            .call("fs.read_file", json!({"path": "/a"}), CallOptions::default())
            .await;

        assert!(result.success);
        assert_eq!(result.attempts, 1);
        let value = result.into_result().unwrap();
        assert_eq!(value["content"], "hello");
        assert_eq!(value["api_key"], "***");
        assert_eq!(fixture.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_redaction_can_be_disabled() {
        let config = ServerConfig {
            redact_secrets: false,
            ..Default::default()
        };
        let (engine, _) = engine_with(config).await;
        let value = engine
            .call("fs.read_file", json!({"path": "/a"}), CallOptions::default())
            .await
            .into_result()
            .unwrap();
        assert_eq!(value["api_key"], "k-123");
    }

    #[tokio::test]
    async fn test_dry_run_never_invokes() {
        let config = ServerConfig {
            dry_run: true,
            ..Default::default()
        };
        let (engine, fixture) = engine_with(config).await;
        let engine = engine.with_credentials(Arc::new(AuthManager::new().with_provider(
            TokenProvider::new("fs", TokenSource::Static("s3cr3t".into())),
        )));

        let result = engine
            .call("fs.delete_file", json!({"path": "/etc"}), CallOptions::default())
            .await;

        assert!(result.success);
        assert!(result.dry_run);
        let preview = result.result.unwrap();
        assert_eq!(preview["dry_run"], true);
        assert_eq!(preview["message"], "would have called fs.delete_file");
        assert_eq!(preview["arguments"]["path"], "/etc");
        assert_eq!(preview["arguments"]["__auth_token"], "***");
        assert_eq!(fixture.deletes.load(Ordering::SeqCst), 0);
        assert_eq!(result.duration_ms, 0.0);

        let audit = engine.stats().dry_run;
        assert_eq!(audit.intercepted, 1);
        assert_eq!(audit.recent[0].tool, "fs.delete_file");
        assert_eq!(audit.recent[0].arguments["__auth_token"], "***");

        // Safe tools still run
        let read = engine
            .call("fs.read_file", json!({"path": "/a"}), CallOptions::default())
            .await;
        assert!(!read.dry_run);
        assert_eq!(fixture.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_calls_do_not_execute() {
        let config = ServerConfig {
            enable_rate_limit: true,
            rate_limit_calls: 2,
            ..Default::default()
        };
        let (engine, fixture) = engine_with(config).await;

        for _ in 0..2 {
            let result = engine
                .call("fs.read_file", json!({"path": "/a"}), CallOptions::default())
                .await;
            assert!(result.success);
        }
        let denied = engine
            .call("fs.read_file", json!({"path": "/a"}), CallOptions::default())
            .await;

        let err = denied.error.unwrap();
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.code(), 429);
        assert_eq!(fixture.reads.load(Ordering::SeqCst), 2);
        assert_eq!(denied.duration_ms, 0.0);
        assert_eq!(engine.stats().rate_limiter.unwrap().total_blocked, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_execution() {
        let config = ServerConfig {
            enable_cache: true,
            ..Default::default()
        };
        let (engine, fixture) = engine_with(config).await;

        let first = engine
            .call("fs.read_file", json!({"path": "/a"}), CallOptions::default())
            .await;
        assert!(!first.cached);

        let second = engine
            .call("fs.read_file", json!({"path": "/a"}), CallOptions::default())
            .await;
        assert!(second.cached);
        assert_eq!(second.duration_ms, 0.0);
        assert_eq!(second.result.unwrap()["content"], "hello");
        assert_eq!(fixture.reads.load(Ordering::SeqCst), 1);

        let bypass = engine
            .call(
                "fs.read_file",
                json!({"path": "/a"}),
                CallOptions { use_cache: false },
            )
            .await;
        assert!(!bypass.cached);
        assert_eq!(fixture.reads.load(Ordering::SeqCst), 2);

        assert!(engine.clear_cache());
        let after_clear = engine
            .call("fs.read_file", json!({"path": "/a"}), CallOptions::default())
            .await;
        assert!(!after_clear.cached);
    }

    #[tokio::test]
    async fn test_clear_cache_when_disabled() {
        let (engine, _) = engine_with(ServerConfig::default()).await;
        assert!(!engine.clear_cache());
        assert!(engine.stats().cache.is_none());
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let config = ServerConfig {
            enable_cache: true,
            ..Default::default()
        };
        let (engine, _) = engine_with(config).await;

        let result = engine
            .call("fs.stat", json!({"path": "/x"}), CallOptions::default())
            .await;
        let err = result.error.unwrap();
        assert_eq!(err.kind, ErrorKind::ExecutionFailed);
        assert_eq!(err.message, "no such file");
        assert_eq!(err.type_name.as_deref(), Some("FileNotFoundError"));
        assert_eq!(engine.cache().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_non_object_arguments() {
        let (engine, _) = engine_with(ServerConfig::default()).await;
        let result = engine
            .call("fs.read_file", json!([1, 2]), CallOptions::default())
            .await;
        assert_eq!(result.error.unwrap().kind, ErrorKind::InvalidRequest);

        let null_args = engine
            .call("fs.read_file", Value::Null, CallOptions::default())
            .await;
        assert!(null_args.success);
    }

    #[tokio::test]
    async fn test_single_page_sets_limit_and_truncates() {
        let config = ServerConfig {
            max_pagination_items: 30,
            ..Default::default()
        };
        let (engine, _) = engine_with(config).await;

        let defaulted = engine
            .call("fs.list_entries", json!({}), CallOptions::default())
            .await;
        let value = defaulted.result.unwrap();
        assert_eq!(value["count"], 30);
        assert_eq!(value["truncated"], false);

        let oversized = engine
            .call("fs.list_entries", json!({"limit": 100}), CallOptions::default())
            .await;
        assert!(oversized.truncated);
        let value = oversized.result.unwrap();
        assert_eq!(value["count"], 30);
        assert_eq!(value["items"].as_array().unwrap().len(), 30);
    }

    #[tokio::test]
    async fn test_collect_all_pages() {
        let config = ServerConfig {
            collect_all_pages: true,
            ..Default::default()
        };
        let (engine, _) = engine_with(config).await;

        let result = engine
            .call("fs.scan_pages", json!({}), CallOptions::default())
            .await;
        let value = result.result.unwrap();
        assert_eq!(value["count"], 23);
        assert_eq!(value["pages_collected"], 3);
        assert_eq!(value["truncated"], false);
    }

    #[tokio::test]
    async fn test_collect_all_degrades_after_first_page() {
        let config = ServerConfig {
            collect_all_pages: true,
            ..Default::default()
        };
        let (engine, _) = engine_with(config).await;

        let result = engine
            .call("fs.walk_pages", json!({}), CallOptions::default())
            .await;
        assert!(result.success);
        let value = result.result.unwrap();
        assert_eq!(value["items"], json!([1, 2, 3]));
        assert_eq!(value["pages_collected"], 1);

        // A failure on the first page is an error
        let first_page = engine
            .call("fs.walk_pages", json!({"cursor": "bad"}), CallOptions::default())
            .await;
        assert_eq!(first_page.error.unwrap().kind, ErrorKind::ExecutionFailed);
    }

    #[tokio::test]
    async fn test_metrics_counters() {
        let metrics = Arc::new(MetricsCollector::new());
        let config = ServerConfig {
            enable_cache: true,
            ..Default::default()
        };
        let (engine, _) = engine_with(config).await;
        let engine = engine.with_metrics(metrics.clone());

        engine
            .call("fs.read_file", json!({"path": "/a"}), CallOptions::default())
            .await;
        engine
            .call("fs.read_file", json!({"path": "/a"}), CallOptions::default())
            .await;
        engine
            .call("fs.stat", json!({"path": "/a"}), CallOptions::default())
            .await;

        let read = labels(&[("tool", "fs.read_file")]);
        assert_eq!(metrics.counter_value("tool.calls", &read), 2);
        assert_eq!(metrics.counter_value("tool.cache_hits", &read), 1);
        assert_eq!(metrics.counter_value("tool.cache_misses", &read), 1);
        assert_eq!(metrics.counter_total("tool.errors"), 1);
        assert_eq!(metrics.counter_total("tool.calls"), 3);
        assert_eq!(
            metrics
                .get_histogram("tool.duration_ms", &read)
                .map(|h| h.count),
            Some(2)
        );
        assert!(metrics.get_counter("tool.rate_limited", &Labels::new()).is_none());
    }

    struct Sleeper(Duration);

    #[async_trait::async_trait]
    impl AsyncOperation for Sleeper {
        async fn call(&self, _arguments: Value) -> Result<Value, OperationError> {
            tokio::time::sleep(self.0).await;
            Ok(json!("done"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_covers_execution_only() {
        let source = StaticSource::new().with(
            "slow",
            MethodDescriptor::new("slow.wait"),
            Operation::awaited(Sleeper(Duration::from_secs(2))),
        );
        let catalog = CatalogBuilder::new()
            .build(&source, &["slow".to_string()])
            .await;
        let engine = InvocationEngine::new(Arc::new(catalog), &ServerConfig::default());

        let result = engine.call("slow.wait", json!({}), CallOptions::default()).await;
        assert!(result.success);
        assert!((2000.0..2100.0).contains(&result.duration_ms), "{}", result.duration_ms);

        let missing = engine.call("slow.gone", json!({}), CallOptions::default()).await;
        assert_eq!(missing.duration_ms, 0.0);
    }
}
