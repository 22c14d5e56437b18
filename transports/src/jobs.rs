//! HTTP job entry points
//!
//! Both entry points perform the same initialization: validate the job,
//! compile its request template, render and decode the client settings,
//! resolve the effective backoff and build the transport. Any failure there
//! is returned before a single request is sent.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use surge_core::template::{render_json, render_string};
use surge_core::{
    GlobalConfig, Job, JobBuilder, JobConfig, JobResult, JobStats, MetricsSink, RequestTemplate,
    SingleShotOutcome, TemplateContext,
};

use crate::http::{ClientConfig, HttpTransport};

/// Build an HTTP job from its configuration
pub fn prepare_http_job(
    config: &JobConfig,
    global: &GlobalConfig,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
) -> JobResult<Job> {
    config.validate()?;
    global.validate()?;

    let template = RequestTemplate::parse(&config.request)?;
    let client = client_config(config, global)?;
    let transport = HttpTransport::new(&client, cancel)?;

    tracing::debug!(
        job = %config.name,
        timeout_ms = client.timeout.as_millis() as u64,
        fail_on_status = client.fail_on_status,
        proxied = client.proxy_urls.is_some(),
        "HTTP client ready"
    );

    JobBuilder::new(&config.name)
        .template(Arc::new(template))
        .transport(Arc::new(transport))
        .metrics(metrics)
        .backoff(config.effective_backoff(global))
        .gate(config.gate.clone())
        .mode(global.mode)
        .flush_interval(global.flush_interval)
        .target(config.request.url.clone())
        .build()
}

/// Render the job's client map once and apply the global proxy override
fn client_config(config: &JobConfig, global: &GlobalConfig) -> JobResult<ClientConfig> {
    let ctx = TemplateContext::new(&config.name, 0);
    let mut client = ClientConfig::from_value(&render_json("client", &config.client, &ctx)?)?;

    if let Some(proxy_urls) = global.proxy_urls.as_deref().filter(|urls| !urls.is_empty()) {
        client.proxy_urls = Some(render_string("proxy_urls", proxy_urls, &ctx)?);
        client.validate()?;
    }

    Ok(client)
}

/// Run an HTTP job until its gate is exhausted or `cancel` fires
pub async fn http_job(
    config: &JobConfig,
    global: &GlobalConfig,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
) -> JobResult<JobStats> {
    let job = prepare_http_job(config, global, metrics, cancel.clone())?;
    job.run(cancel).await
}

/// Send one HTTP request and return what came back
pub async fn single_request_job(
    config: &JobConfig,
    global: &GlobalConfig,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
) -> JobResult<SingleShotOutcome> {
    let job = prepare_http_job(config, global, metrics, cancel)?;
    job.run_once().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use surge_core::{
        BackoffConfig, ConfigError, ExecutionMode, GateConfig, InMemoryMetrics, JobError,
        RequestTemplateConfig, StreamKind,
    };
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job_config(url: String) -> JobConfig {
        JobConfig::new(
            "http-test",
            RequestTemplateConfig::get(url).with_header("X-Iteration", "{{iteration}}"),
        )
    }

    fn global() -> GlobalConfig {
        GlobalConfig::default()
    }

    async fn ok_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "fresh=1")
                    .set_body_string("ok"),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_http_job_runs_count() {
        let server = ok_server().await;
        let config = job_config(format!("{}/pinger", server.uri()))
            .with_gate(GateConfig::default().with_count(3));
        let metrics = Arc::new(InMemoryMetrics::new());

        let stats = http_job(
            &config,
            &global(),
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.successes, 3);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);

        let summary = metrics.summary();
        assert_eq!(summary.successful_exchanges, 3);
        assert_eq!(summary.attempted_bytes, stats.attempted_bytes);
        assert_eq!(summary.delivered_bytes, summary.attempted_bytes);
    }

    #[tokio::test]
    async fn test_http_job_survives_unreachable_target() {
        let config = job_config("http://127.0.0.1:1/".into())
            .with_gate(GateConfig::default().with_count(2));
        let global = global()
            .with_mode(ExecutionMode::Confidential)
            .with_backoff(BackoffConfig::new(
                Duration::from_millis(1),
                Duration::from_millis(5),
                2.0,
            ));
        let metrics = Arc::new(InMemoryMetrics::new());

        let stats = http_job(
            &config,
            &global,
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(stats.failures, 2);
        assert_eq!(metrics.total(StreamKind::Delivered), 0);
        assert!(metrics.total(StreamKind::Attempted) > 0);
    }

    #[tokio::test]
    async fn test_single_request_job() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/once"))
            .and(header("x-iteration", "0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "fresh=1")
                    .set_body_string("ok"),
            )
            .mount(&server)
            .await;
        let config = job_config(format!("{}/once", server.uri()));

        let outcome = single_request_job(
            &config,
            &global(),
            Arc::new(InMemoryMetrics::new()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.response.status_code, 200);
        assert_eq!(outcome.response.body, "ok");
        assert_eq!(outcome.response.cookies.len(), 1);
        assert_eq!(outcome.response.cookies["fresh"], "1");
    }

    #[test]
    fn test_client_map_is_rendered() {
        let config = job_config("http://localhost/".into()).with_client(serde_json::json!({
            "timeout": "{{rand_int 2 2}}s",
            "proxy_urls": "http://{{job}}.local:3128",
        }));

        let client = client_config(&config, &global()).unwrap();
        assert_eq!(client.timeout, Duration::from_secs(2));
        assert_eq!(client.proxy_urls.as_deref(), Some("http://http-test.local:3128"));
    }

    #[test]
    fn test_global_proxy_overrides_client() {
        let config = job_config("http://localhost/".into())
            .with_client(serde_json::json!({"proxy_urls": "http://job.local:3128"}));
        let global = global().with_proxy_urls("http://{{job}}-a.local:3128,http://b.local:3128");

        let client = client_config(&config, &global).unwrap();
        assert_eq!(
            client.proxy_urls.as_deref(),
            Some("http://http-test-a.local:3128,http://b.local:3128")
        );
        assert_eq!(client.proxies().unwrap().len(), 2);

        let broken = global.clone().with_proxy_urls("gopher://x.local");
        assert!(matches!(
            client_config(&config, &broken),
            Err(JobError::Config(ConfigError::InvalidClient(_)))
        ));
    }

    #[tokio::test]
    async fn test_global_proxy_routes_job() {
        let proxy = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("host", "target.invalid"))
            .respond_with(ResponseTemplate::new(200).set_body_string("via proxy"))
            .mount(&proxy)
            .await;
        let config = job_config("http://target.invalid/x".into());
        let global = global().with_proxy_urls(proxy.uri());

        let outcome = single_request_job(
            &config,
            &global,
            Arc::new(InMemoryMetrics::new()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.is_success(), "{:?}", outcome.error);
        assert_eq!(outcome.response.body, "via proxy");
    }

    #[tokio::test]
    async fn test_initialization_failures() {
        let metrics: Arc<dyn MetricsSink> = Arc::new(InMemoryMetrics::new());
        let cancel = CancellationToken::new();

        let bad_template = job_config("http://localhost/{{#if}}".into());
        let err = prepare_http_job(&bad_template, &global(), Arc::clone(&metrics), cancel.clone())
            .unwrap_err();
        assert!(err.is_template());

        let bad_client = job_config("http://localhost/".into())
            .with_client(serde_json::json!({"retries": 3}));
        let err = prepare_http_job(&bad_client, &global(), Arc::clone(&metrics), cancel.clone())
            .unwrap_err();
        assert!(matches!(err, JobError::Config(ConfigError::InvalidClient(_))));

        let unrendered_client = job_config("http://localhost/".into())
            .with_client(serde_json::json!({"timeout": "{{missing}}"}));
        let err = prepare_http_job(
            &unrendered_client,
            &global(),
            Arc::clone(&metrics),
            cancel.clone(),
        )
        .unwrap_err();
        assert!(err.is_template());

        let no_url = job_config(String::new());
        let err = prepare_http_job(&no_url, &global(), metrics, cancel).unwrap_err();
        assert!(matches!(err, JobError::Config(ConfigError::MissingField(_))));
    }
}
