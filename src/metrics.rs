use std::sync::LazyLock;

use prometheus::*;

static METRIC_INGEST_RECORDS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "imembed_ingest_records",
        "count of the ingested records by stage and outcome",
        &["stage", "outcome"]
    )
    .unwrap()
});

static METRIC_QUERY_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!("imembed_query_duration", "duration of the per-query retrieval in seconds")
        .unwrap()
});

static METRIC_QUERY_HITS: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "imembed_query_hits",
        "number of hits returned per query",
        vec![0., 1., 2., 5., 10., 20., 50., 100.]
    )
    .unwrap()
});

/// 记录一条成功导入的图片
pub fn inc_ingest_success() {
    METRIC_INGEST_RECORDS.with_label_values(&["upsert", "success"]).inc();
}

/// 记录一条在 `stage` 阶段失败的图片
pub fn inc_ingest_failure(stage: &str) {
    METRIC_INGEST_RECORDS.with_label_values(&[stage, "failure"]).inc();
}

pub fn observe_query(duration: f32, hits: usize) {
    METRIC_QUERY_DURATION.observe(duration as f64);
    METRIC_QUERY_HITS.observe(hits as f64);
}

/// 推送所有指标到 pushgateway
pub fn push(url: &str, instance: &str, auth: Option<(String, String)>) -> Result<()> {
    prometheus::push_metrics(
        "imembed",
        labels! {
            "instance".to_string() => instance.to_string(),
        },
        url,
        prometheus::gather(),
        auth.map(|(username, password)| BasicAuthentication { username, password }),
    )
}
