use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub type Labels = HashMap<String, String>;

/// Build a label set from string pairs
pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Destination for the counters and timings emitted by the pipeline and dispatcher
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &str, labels: Labels);

    fn set_gauge(&self, name: &str, value: f64, labels: Labels);

    fn observe_histogram(&self, name: &str, value: f64, labels: Labels);

    /// Aggregated view reported through `server/info`
    fn snapshot(&self) -> Value;
}

/// Counter - monotonically increasing value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    pub name: String,
    pub value: u64,
    pub labels: Labels,
    pub last_updated: DateTime<Utc>,
}

/// Gauge - value that can go up or down
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gauge {
    pub name: String,
    pub value: f64,
    pub labels: Labels,
    pub last_updated: DateTime<Utc>,
}

/// Histogram - tracks distribution of values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Histogram {
    pub name: String,
    pub buckets: Vec<f64>,
    pub counts: Vec<u64>,
    pub sum: f64,
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub labels: Labels,
    pub last_updated: DateTime<Utc>,
}

/// Default bucket bounds, in milliseconds
const DEFAULT_BUCKETS_MS: &[f64] = &[
    1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1_000.0, 5_000.0, 10_000.0, 30_000.0, 60_000.0,
];

/// In-memory metrics collector
pub struct MetricsCollector {
    counters: Mutex<HashMap<String, Counter>>,
    gauges: Mutex<HashMap<String, Gauge>>,
    histograms: Mutex<HashMap<String, Histogram>>,
    started_at: DateTime<Utc>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
            started_at: Utc::now(),
        }
    }

    /// Increment a counter by a specific amount
    pub fn increment_counter_by(&self, name: &str, value: u64, labels: Labels) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let key = Self::metric_key(name, &labels);

        counters
            .entry(key)
            .and_modify(|c| {
                c.value += value;
                c.last_updated = Utc::now();
            })
            .or_insert_with(|| Counter {
                name: name.to_string(),
                value,
                labels,
                last_updated: Utc::now(),
            });
    }

    /// Get a specific counter
    pub fn get_counter(&self, name: &str, labels: &Labels) -> Option<Counter> {
        let key = Self::metric_key(name, labels);
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Value of a counter, zero when it was never incremented
    pub fn counter_value(&self, name: &str, labels: &Labels) -> u64 {
        self.get_counter(name, labels).map(|c| c.value).unwrap_or(0)
    }

    /// Sum of a counter across every label set
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| c.name == name)
            .map(|c| c.value)
            .sum()
    }

    /// Get a specific gauge
    pub fn get_gauge(&self, name: &str, labels: &Labels) -> Option<Gauge> {
        let key = Self::metric_key(name, labels);
        self.gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Get a specific histogram
    pub fn get_histogram(&self, name: &str, labels: &Labels) -> Option<Histogram> {
        let key = Self::metric_key(name, labels);
        self.histograms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Generate a unique key for a metric with labels
    fn metric_key(name: &str, labels: &Labels) -> String {
        if labels.is_empty() {
            return name.to_string();
        }

        let mut sorted_labels: Vec<_> = labels.iter().collect();
        sorted_labels.sort_by_key(|(k, _)| *k);

        let label_str = sorted_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");

        format!("{}:{}", name, label_str)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for MetricsCollector {
    fn increment_counter(&self, name: &str, labels: Labels) {
        self.increment_counter_by(name, 1, labels);
    }

    fn set_gauge(&self, name: &str, value: f64, labels: Labels) {
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        let key = Self::metric_key(name, &labels);

        gauges
            .entry(key)
            .and_modify(|g| {
                g.value = value;
                g.last_updated = Utc::now();
            })
            .or_insert_with(|| Gauge {
                name: name.to_string(),
                value,
                labels,
                last_updated: Utc::now(),
            });
    }

    fn observe_histogram(&self, name: &str, value: f64, labels: Labels) {
        let mut histograms = self.histograms.lock().unwrap_or_else(PoisonError::into_inner);
        let key = Self::metric_key(name, &labels);

        let histogram = histograms.entry(key).or_insert_with(|| Histogram {
            name: name.to_string(),
            buckets: DEFAULT_BUCKETS_MS.to_vec(),
            counts: vec![0; DEFAULT_BUCKETS_MS.len()],
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            labels,
            last_updated: Utc::now(),
        });

        histogram.sum += value;
        histogram.count += 1;
        histogram.min = histogram.min.min(value);
        histogram.max = histogram.max.max(value);
        for (i, bucket) in histogram.buckets.iter().enumerate() {
            if value <= *bucket {
                histogram.counts[i] += 1;
            }
        }
        histogram.last_updated = Utc::now();
    }

    fn snapshot(&self) -> Value {
        let counters: Map<String, Value> = self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, c)| (key.clone(), json!(c.value)))
            .collect();

        let gauges: Map<String, Value> = self
            .gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, g)| (key.clone(), json!(g.value)))
            .collect();

        let timers: Map<String, Value> = self
            .histograms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, h)| {
                (
                    key.clone(),
                    json!({
                        "count": h.count,
                        "total": h.sum,
                        "min": h.min,
                        "max": h.max,
                        "avg": h.average(),
                        "p50": h.percentile(50.0),
                        "p95": h.percentile(95.0),
                    }),
                )
            })
            .collect();

        let uptime = (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0;

        json!({
            "started_at": self.started_at,
            "uptime_seconds": uptime,
            "counters": counters,
            "gauges": gauges,
            "timers": timers,
        })
    }
}

impl Histogram {
    /// Calculate percentile (p50, p95, p99, etc.) as a bucket upper bound
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.count == 0 || !(0.0..=100.0).contains(&p) {
            return None;
        }

        let target_count = ((self.count as f64) * (p / 100.0)).ceil() as u64;

        for (i, count) in self.counts.iter().enumerate() {
            if *count >= target_count {
                return Some(self.buckets[i]);
            }
        }

        None
    }

    /// Calculate average
    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}
