use exam_console::api::client::MetricPaths;
use exam_console::config::ApiConfig;
use exam_console::{ApiClient, MetricsSource};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::sync::{Mutex, Once};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct CapturingLogger;

static RECORDS: Mutex<Vec<(Level, String, String)>> = Mutex::new(Vec::new());
static LOGGER: CapturingLogger = CapturingLogger;
static INIT: Once = Once::new();

impl Log for CapturingLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS.lock().unwrap().push((
            record.level(),
            record.target().to_string(),
            record.args().to_string(),
        ));
    }

    fn flush(&self) {}
}

fn capture_logs() {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
}

fn client_records() -> Vec<(Level, String)> {
    RECORDS
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, target, _)| target.starts_with("exam_console::api"))
        .map(|(level, _, message)| (*level, message.clone()))
        .collect()
}

#[tokio::test]
async fn missing_endpoint_is_not_logged_as_an_error() {
    capture_logs();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/logs/activity"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = ApiConfig {
        base_url: server.uri(),
        ..ApiConfig::default()
    };
    let api = ApiClient::new(&config, None)
        .unwrap()
        .with_metric_paths(MetricPaths {
            activity_logs: Some("api/v1/logs/activity".into()),
            ..MetricPaths::default()
        });

    let err = api.fetch_activity_logs().await.unwrap_err();
    assert!(err.is_unimplemented());

    let records = client_records();
    assert!(
        records
            .iter()
            .any(|(level, message)| *level == Level::Debug && message.contains("404"))
    );
    assert!(
        !records
            .iter()
            .any(|(level, message)| *level <= Level::Warn && message.contains("404")),
        "{:?}",
        records
    );
}
