use shared::metrics_defs::{MetricDef, MetricType};

pub const PAYMENTS_ACCEPTED: MetricDef = MetricDef {
    name: "payments.accepted",
    metric_type: MetricType::Counter,
    description: "Payments accepted and queued for processing",
};

pub const PAYMENTS_REJECTED: MetricDef = MetricDef {
    name: "payments.rejected",
    metric_type: MetricType::Counter,
    description: "Payments rejected because the queue was full or closed",
};

pub const PAYMENTS_RECORDED: MetricDef = MetricDef {
    name: "payments.recorded",
    metric_type: MetricType::Counter,
    description: "Payments accepted by a processor and recorded. Tagged with route.",
};

pub const PAYMENTS_ABANDONED: MetricDef = MetricDef {
    name: "payments.abandoned",
    metric_type: MetricType::Counter,
    description: "Payments given up after exhausting attempts or on shutdown",
};

pub const PAYMENT_RETRIES: MetricDef = MetricDef {
    name: "payments.retries",
    metric_type: MetricType::Counter,
    description: "Backoff retries after both processors failed",
};

pub const UPSTREAM_FAILURES: MetricDef = MetricDef {
    name: "upstream.submit.failures",
    metric_type: MetricType::Counter,
    description: "Failed payment submissions. Tagged with route.",
};

pub const STORE_ERRORS: MetricDef = MetricDef {
    name: "store.errors",
    metric_type: MetricType::Counter,
    description: "Store operations that failed after a processor accepted the payment",
};

pub const HEALTH_PROBES: MetricDef = MetricDef {
    name: "health.probes",
    metric_type: MetricType::Counter,
    description: "Health probes sent to processors. Tagged with route.",
};

pub const HEALTH_PROBE_FAILURES: MetricDef = MetricDef {
    name: "health.probe.failures",
    metric_type: MetricType::Counter,
    description: "Health probes that failed or timed out. Tagged with route.",
};

pub const PEER_SUMMARY_FAILURES: MetricDef = MetricDef {
    name: "peer.summary.failures",
    metric_type: MetricType::Counter,
    description: "Summary queries answered with local data only because the peer failed",
};

pub const SUMMARY_DURATION: MetricDef = MetricDef {
    name: "summary.duration",
    metric_type: MetricType::Histogram,
    description: "Time to build the combined summary in seconds",
};

pub const QUEUE_DEPTH: MetricDef = MetricDef {
    name: "router.queue.depth",
    metric_type: MetricType::Gauge,
    description: "Payments waiting for a router worker",
};

pub const ALL_METRICS: &[MetricDef] = &[
    PAYMENTS_ACCEPTED,
    PAYMENTS_REJECTED,
    PAYMENTS_RECORDED,
    PAYMENTS_ABANDONED,
    PAYMENT_RETRIES,
    UPSTREAM_FAILURES,
    STORE_ERRORS,
    HEALTH_PROBES,
    HEALTH_PROBE_FAILURES,
    PEER_SUMMARY_FAILURES,
    SUMMARY_DURATION,
    QUEUE_DEPTH,
];
