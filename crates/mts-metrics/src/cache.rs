//! Short-TTL metric memoization
//!
//! Not a correctness store: it exists to absorb the N-way reference-metric
//! fan-out when many tests share a reference. Entries expire after a short
//! TTL, the map is bounded with LRU eviction, and writes are
//! last-writer-wins. Pending responses are never cached.

use crate::client::{BiasRequest, BiasValue, InputSpec, MetricClient, MetricValue, OutputSpec};
use crate::pending::Pending;
use mts_core::types::{AccuracyType, DistanceType, ScoreType};
use mts_core::{RequestContext, Result};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Observed default capacity per cache kind
pub const DEFAULT_CACHE_SIZE: usize = 128;
/// Observed default entry lifetime
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A bounded map whose entries expire after a fixed TTL.
///
/// Least-recently-used entries are evicted once capacity is reached.
pub struct TtlCache<K, V> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<K, Entry<V>>,
    order: Vec<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create a cache with the given capacity and TTL
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Fetch a live entry, refreshing its recency
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                let value = entry.value.clone();
                self.touch(key);
                Some(value)
            }
            Some(_) => {
                self.entries.remove(key);
                self.order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    /// Insert an entry, evicting expired and least-recently-used ones
    pub fn insert(&mut self, key: K, value: V) {
        self.purge_expired();
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.first().cloned() {
                self.entries.remove(&oldest);
                self.order.remove(0);
            }
        }
        self.entries.insert(
            key.clone(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
        self.order.push(key);
    }

    /// Drop expired entries
    pub fn purge_expired(&mut self) {
        let ttl = self.ttl;
        let entries = &mut self.entries;
        entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        let live = &*entries;
        self.order.retain(|k| live.contains_key(k));
    }

    /// Number of entries, including not-yet-purged expired ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &K) {
        self.order.retain(|k| k != key);
        self.order.push(key.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PerformanceKey {
    project_id: String,
    model_id: String,
    split_id: String,
    accuracy_type: AccuracyType,
    segment_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InfluenceKey {
    project_id: String,
    model_id: String,
    split_id: String,
    background_split_id: String,
    score_type: ScoreType,
    segment_filter: Option<String>,
}

/// A [`MetricClient`] decorator that memoizes single-spec performance lookups
/// and feature-importance lookups.
///
/// Batch entry points pass through uncached; the single-spec path is the one
/// threshold evaluation hammers when many tests share a reference metric.
pub struct CachingMetricClient<C> {
    inner: C,
    performance: Mutex<TtlCache<PerformanceKey, MetricValue>>,
    influence: Mutex<TtlCache<InfluenceKey, BTreeMap<String, f64>>>,
}

impl<C: MetricClient> CachingMetricClient<C> {
    /// Wrap a client with the observed default cache tunables
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self::with_tunables(inner, DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL)
    }

    /// Wrap a client with explicit cache capacity and TTL
    #[must_use]
    pub fn with_tunables(inner: C, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            performance: Mutex::new(TtlCache::new(capacity, ttl)),
            influence: Mutex::new(TtlCache::new(capacity, ttl)),
        }
    }

    /// The wrapped client
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// One accuracy metric for one (model, split, segment), memoized.
    ///
    /// # Errors
    ///
    /// Transport-level failures from the wrapped client.
    pub fn performance_single(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model_id: &str,
        split_id: &str,
        accuracy_type: AccuracyType,
        segment_filter: Option<&str>,
    ) -> Result<Pending<MetricValue>> {
        let key = PerformanceKey {
            project_id: project_id.to_string(),
            model_id: model_id.to_string(),
            split_id: split_id.to_string(),
            accuracy_type,
            segment_filter: segment_filter.map(str::to_string),
        };
        if let Some(hit) = self
            .performance
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Pending::Ready(hit));
        }
        let mut spec = InputSpec::all_rows(split_id);
        if let Some(filter) = segment_filter {
            spec = spec.with_filter(filter);
        }
        let mut batch =
            self.inner
                .performance_batch(ctx, project_id, model_id, &[spec], accuracy_type)?;
        let result = batch.pop().unwrap_or_else(|| {
            Pending::Ready(MetricValue::Failed(
                "metric engine returned an empty batch".to_string(),
            ))
        });
        if let Pending::Ready(value) = &result {
            self.performance
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key, value.clone());
        }
        Ok(result)
    }
}

impl<C: MetricClient> MetricClient for CachingMetricClient<C> {
    fn performance_batch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model_id: &str,
        specs: &[InputSpec],
        accuracy_type: AccuracyType,
    ) -> Result<Vec<Pending<MetricValue>>> {
        self.inner
            .performance_batch(ctx, project_id, model_id, specs, accuracy_type)
    }

    fn stability_batch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        requests: &BTreeMap<DistanceType, Vec<(OutputSpec, OutputSpec)>>,
    ) -> Result<BTreeMap<DistanceType, Vec<Pending<MetricValue>>>> {
        self.inner.stability_batch(ctx, project_id, requests)
    }

    fn fairness_batch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        requests: &[BiasRequest],
    ) -> Result<Vec<Pending<Vec<BiasValue>>>> {
        self.inner.fairness_batch(ctx, project_id, requests)
    }

    fn feature_importances(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model_id: &str,
        split_id: &str,
        background_split_id: &str,
        score_type: ScoreType,
        segment_filter: Option<&str>,
    ) -> Result<Pending<BTreeMap<String, f64>>> {
        let key = InfluenceKey {
            project_id: project_id.to_string(),
            model_id: model_id.to_string(),
            split_id: split_id.to_string(),
            background_split_id: background_split_id.to_string(),
            score_type,
            segment_filter: segment_filter.map(str::to_string),
        };
        if let Some(hit) = self
            .influence
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Pending::Ready(hit));
        }
        let result = self.inner.feature_importances(
            ctx,
            project_id,
            model_id,
            split_id,
            background_split_id,
            score_type,
            segment_filter,
        )?;
        if let Pending::Ready(map) = &result {
            self.influence
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key, map.clone());
        }
        Ok(result)
    }
}
