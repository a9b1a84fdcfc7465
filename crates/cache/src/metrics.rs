//! Metric emission for the snapshot cache.
//!
//! The cache only talks to the [`CacheMetrics`] trait. [`PrometheusCacheMetrics`]
//! registers its families with a `prometheus-client` registry:
//!
//! - `xds_snapshot_create_total{status,reason}`
//! - `xds_snapshot_update_total{status,reason,node_id}`
//! - `xds_open_streams{is_delta_stream}`
//! - `xds_stream_duration_seconds{stream_id,node_id,is_delta_stream}`
//! - `xds_request_duration_seconds{phase,is_delta_stream}`
//! - `xds_delta_response_duration_seconds{stream_id,node_id}`
//! - `xds_nack_total{node_id,type_url,is_delta_stream}`
//! - `watchable_depth{runner,message}`
//! - `watchable_subscribe_duration_seconds{runner,message}`
//! - `watchable_subscribe_total{runner,message,status,reason}`

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::{Family, MetricConstructor};
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use xds_snapshot_primitives::stream::{StreamId, StreamKind};

/// Failure reason used when the underlying error carries no finer category.
pub const REASON_ERROR: &str = "error";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome<'a> {
    Success,
    Failure { reason: &'a str },
}

impl<'a> Outcome<'a> {
    const fn status(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure { .. } => "failure",
        }
    }

    const fn reason(self) -> &'a str {
        match self {
            Self::Success => "",
            Self::Failure { reason } => reason,
        }
    }
}

/// Which part of request handling a duration covers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestPhase {
    /// From request arrival until the cache lock was acquired.
    Lock,
    /// From request arrival until handling finished.
    Finish,
}

impl RequestPhase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Finish => "finish",
        }
    }
}

pub trait CacheMetrics: Send + Sync + fmt::Debug {
    fn record_snapshot_create(&self, outcome: Outcome<'_>);

    fn record_snapshot_update(&self, node_id: &str, outcome: Outcome<'_>);

    fn set_open_streams(&self, kind: StreamKind, count: usize);

    fn record_stream_duration(
        &self,
        stream_id: StreamId,
        node_id: &str,
        kind: StreamKind,
        duration: Duration,
    );

    fn record_request_duration(&self, kind: StreamKind, phase: RequestPhase, duration: Duration);

    fn record_delta_response_duration(
        &self,
        stream_id: StreamId,
        node_id: &str,
        duration: Duration,
    );

    fn record_nack(&self, node_id: &str, type_url: &str, kind: StreamKind);

    fn set_queue_depth(&self, runner: &str, message: &str, depth: usize);

    fn record_subscribe(
        &self,
        runner: &str,
        message: &str,
        outcome: Outcome<'_>,
        duration: Duration,
    );
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCacheMetrics;

impl CacheMetrics for NoopCacheMetrics {
    fn record_snapshot_create(&self, _outcome: Outcome<'_>) {}

    fn record_snapshot_update(&self, _node_id: &str, _outcome: Outcome<'_>) {}

    fn set_open_streams(&self, _kind: StreamKind, _count: usize) {}

    fn record_stream_duration(
        &self,
        _stream_id: StreamId,
        _node_id: &str,
        _kind: StreamKind,
        _duration: Duration,
    ) {
    }

    fn record_request_duration(
        &self,
        _kind: StreamKind,
        _phase: RequestPhase,
        _duration: Duration,
    ) {
    }

    fn record_delta_response_duration(
        &self,
        _stream_id: StreamId,
        _node_id: &str,
        _duration: Duration,
    ) {
    }

    fn record_nack(&self, _node_id: &str, _type_url: &str, _kind: StreamKind) {}

    fn set_queue_depth(&self, _runner: &str, _message: &str, _depth: usize) {}

    fn record_subscribe(
        &self,
        _runner: &str,
        _message: &str,
        _outcome: Outcome<'_>,
        _duration: Duration,
    ) {
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    status: String,
    reason: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct NodeOutcomeLabels {
    status: String,
    reason: String,
    node_id: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    is_delta_stream: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct StreamLabels {
    stream_id: String,
    node_id: String,
    is_delta_stream: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct PhaseLabels {
    phase: String,
    is_delta_stream: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResponseLabels {
    stream_id: String,
    node_id: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct NackLabels {
    node_id: String,
    type_url: String,
    is_delta_stream: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct WatchableLabels {
    runner: String,
    message: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct WatchableOutcomeLabels {
    runner: String,
    message: String,
    status: String,
    reason: String,
}

/// Builds every histogram in a family with the configured buckets.
#[derive(Clone, Debug)]
struct Buckets(Arc<[f64]>);

impl MetricConstructor<Histogram> for Buckets {
    fn new_metric(&self) -> Histogram {
        Histogram::new(self.0.iter().copied())
    }
}

type HistogramFamily<L> = Family<L, Histogram, Buckets>;

#[derive(Debug)]
pub struct PrometheusCacheMetrics {
    snapshot_create_total: Family<OutcomeLabels, Counter>,
    snapshot_update_total: Family<NodeOutcomeLabels, Counter>,
    open_streams: Family<KindLabels, Gauge>,
    stream_duration_seconds: HistogramFamily<StreamLabels>,
    request_duration_seconds: HistogramFamily<PhaseLabels>,
    delta_response_duration_seconds: HistogramFamily<ResponseLabels>,
    nack_total: Family<NackLabels, Counter>,
    watchable_depth: Family<WatchableLabels, Gauge>,
    watchable_subscribe_duration_seconds: HistogramFamily<WatchableLabels>,
    watchable_subscribe_total: Family<WatchableOutcomeLabels, Counter>,
}

impl PrometheusCacheMetrics {
    /// Creates the metric families and registers them with `registry`.
    ///
    /// `buckets` are the upper bounds, in seconds, of every histogram.
    pub fn new(registry: &mut Registry, buckets: &[f64]) -> Self {
        let buckets = Buckets(buckets.into());

        let metrics = Self {
            snapshot_create_total: Family::default(),
            snapshot_update_total: Family::default(),
            open_streams: Family::default(),
            stream_duration_seconds: Family::new_with_constructor(buckets.clone()),
            request_duration_seconds: Family::new_with_constructor(buckets.clone()),
            delta_response_duration_seconds: Family::new_with_constructor(buckets.clone()),
            nack_total: Family::default(),
            watchable_depth: Family::default(),
            watchable_subscribe_duration_seconds: Family::new_with_constructor(buckets),
            watchable_subscribe_total: Family::default(),
        };

        registry.register(
            "xds_snapshot_create",
            "Total number of xds snapshot cache creates.",
            metrics.snapshot_create_total.clone(),
        );
        registry.register(
            "xds_snapshot_update",
            "Total number of xds snapshot cache updates by node id.",
            metrics.snapshot_update_total.clone(),
        );
        registry.register(
            "xds_open_streams",
            "Current number of registered xds streams.",
            metrics.open_streams.clone(),
        );
        registry.register(
            "xds_stream_duration_seconds",
            "How long a xds stream takes to finish.",
            metrics.stream_duration_seconds.clone(),
        );
        registry.register(
            "xds_request_duration_seconds",
            "How long a xds request takes to acquire the cache lock and to finish.",
            metrics.request_duration_seconds.clone(),
        );
        registry.register(
            "xds_delta_response_duration_seconds",
            "Time between an incremental xds request and its response.",
            metrics.delta_response_duration_seconds.clone(),
        );
        registry.register(
            "xds_nack",
            "Total number of xds updates rejected by a node.",
            metrics.nack_total.clone(),
        );
        registry.register(
            "watchable_depth",
            "Current depth of watchable queue.",
            metrics.watchable_depth.clone(),
        );
        registry.register(
            "watchable_subscribe_duration_seconds",
            "How long in seconds a subscribed watchable queue is handled.",
            metrics.watchable_subscribe_duration_seconds.clone(),
        );
        registry.register(
            "watchable_subscribe",
            "Total number of subscribed watchable queue.",
            metrics.watchable_subscribe_total.clone(),
        );

        metrics
    }
}

fn saturating_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl CacheMetrics for PrometheusCacheMetrics {
    fn record_snapshot_create(&self, outcome: Outcome<'_>) {
        let labels = OutcomeLabels {
            status: outcome.status().to_owned(),
            reason: outcome.reason().to_owned(),
        };
        let _ = self.snapshot_create_total.get_or_create(&labels).inc();
    }

    fn record_snapshot_update(&self, node_id: &str, outcome: Outcome<'_>) {
        let labels = NodeOutcomeLabels {
            status: outcome.status().to_owned(),
            reason: outcome.reason().to_owned(),
            node_id: node_id.to_owned(),
        };
        let _ = self.snapshot_update_total.get_or_create(&labels).inc();
    }

    fn set_open_streams(&self, kind: StreamKind, count: usize) {
        let labels = KindLabels {
            is_delta_stream: kind.delta_label().to_owned(),
        };
        let _ = self
            .open_streams
            .get_or_create(&labels)
            .set(saturating_i64(count));
    }

    fn record_stream_duration(
        &self,
        stream_id: StreamId,
        node_id: &str,
        kind: StreamKind,
        duration: Duration,
    ) {
        let labels = StreamLabels {
            stream_id: stream_id.to_string(),
            node_id: node_id.to_owned(),
            is_delta_stream: kind.delta_label().to_owned(),
        };
        self.stream_duration_seconds
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());
    }

    fn record_request_duration(&self, kind: StreamKind, phase: RequestPhase, duration: Duration) {
        let labels = PhaseLabels {
            phase: phase.as_str().to_owned(),
            is_delta_stream: kind.delta_label().to_owned(),
        };
        self.request_duration_seconds
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());
    }

    fn record_delta_response_duration(
        &self,
        stream_id: StreamId,
        node_id: &str,
        duration: Duration,
    ) {
        let labels = ResponseLabels {
            stream_id: stream_id.to_string(),
            node_id: node_id.to_owned(),
        };
        self.delta_response_duration_seconds
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());
    }

    fn record_nack(&self, node_id: &str, type_url: &str, kind: StreamKind) {
        let labels = NackLabels {
            node_id: node_id.to_owned(),
            type_url: type_url.to_owned(),
            is_delta_stream: kind.delta_label().to_owned(),
        };
        let _ = self.nack_total.get_or_create(&labels).inc();
    }

    fn set_queue_depth(&self, runner: &str, message: &str, depth: usize) {
        let labels = WatchableLabels {
            runner: runner.to_owned(),
            message: message.to_owned(),
        };
        let _ = self
            .watchable_depth
            .get_or_create(&labels)
            .set(saturating_i64(depth));
    }

    fn record_subscribe(
        &self,
        runner: &str,
        message: &str,
        outcome: Outcome<'_>,
        duration: Duration,
    ) {
        let labels = WatchableLabels {
            runner: runner.to_owned(),
            message: message.to_owned(),
        };
        self.watchable_subscribe_duration_seconds
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());

        let labels = WatchableOutcomeLabels {
            runner: runner.to_owned(),
            message: message.to_owned(),
            status: outcome.status().to_owned(),
            reason: outcome.reason().to_owned(),
        };
        let _ = self.watchable_subscribe_total.get_or_create(&labels).inc();
    }
}
