//! Time-series storage: point shape, InfluxDB line protocol and the HTTP
//! write sink.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use time::OffsetDateTime;

use crate::config::StorageCfg;
use crate::domain::{FieldValue, TelemetryEvent};
use crate::sink::{PointSink, SinkError};

/// One tagged, timestamped set of fields in a named measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: &'static str,
    pub tags: Vec<(&'static str, String)>,
    pub fields: Vec<(String, FieldValue)>,
    pub timestamp: OffsetDateTime,
}

impl Point {
    pub fn from_event(event: &TelemetryEvent) -> Self {
        let schema = event.entity_type.schema();
        Self {
            measurement: schema.measurement,
            tags: vec![(schema.tag_key, event.entity_id.clone())],
            fields: event.fields.clone(),
            timestamp: event.timestamp,
        }
    }

    /// Encodes the point as one line of InfluxDB line protocol.
    ///
    /// Null fields are left out. Returns `None` when nothing is left to write.
    pub fn to_line_protocol(&self) -> Option<String> {
        let mut line = escape(self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            let _ = write!(line, ",{}={}", escape(key, KEY_CHARS), escape(value, KEY_CHARS));
        }

        let mut first = true;
        for (key, value) in &self.fields {
            let encoded = match value {
                FieldValue::Int(i) => format!("{i}i"),
                FieldValue::Float(f) => format!("{f}"),
                FieldValue::Bool(b) => format!("{b}"),
                FieldValue::Str(s) => format!("\"{}\"", escape(s, &['"', '\\'])),
                FieldValue::Null => continue,
            };
            line.push(if first { ' ' } else { ',' });
            first = false;
            let _ = write!(line, "{}={encoded}", escape(key, KEY_CHARS));
        }
        if first {
            return None;
        }

        let _ = write!(line, " {}", self.timestamp.unix_timestamp_nanos());
        Some(line)
    }
}

const KEY_CHARS: &[char] = &[',', '=', ' '];

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Writes points to the InfluxDB v2 HTTP API.
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: Url,
    token: String,
}

impl InfluxSink {
    pub fn new(cfg: &StorageCfg) -> anyhow::Result<Self> {
        let base = cfg.url.trim_end_matches('/');
        let write_url = Url::parse_with_params(
            &format!("{base}/api/v2/write"),
            &[
                ("org", cfg.org.as_str()),
                ("bucket", cfg.bucket.as_str()),
                ("precision", "ns"),
            ],
        )?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            write_url,
            token: cfg.token.clone(),
        })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

#[async_trait]
impl PointSink for InfluxSink {
    async fn write(&self, point: &Point) -> Result<(), SinkError> {
        let Some(body) = point.to_line_protocol() else {
            return Ok(());
        };
        let resp = self
            .client
            .post(self.write_url.clone())
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::StorageWrite(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let detail = resp.text().await.unwrap_or_default();
            Err(SinkError::StorageWrite(format!("{status}: {detail}")))
        }
    }
}

/// Hits the store's `/health` endpoint. Used by the readiness probe.
pub async fn probe(client: &reqwest::Client, base_url: &str) -> bool {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    matches!(client.get(url).send().await, Ok(resp) if resp.status().is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityType;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use std::sync::{Arc, Mutex};
    use time::macros::datetime;

    fn robot_event() -> TelemetryEvent {
        TelemetryEvent {
            entity_type: EntityType::Robot,
            entity_id: "robot 001".into(),
            timestamp: datetime!(2024-05-20 12:00:00 UTC),
            source_timestamp: "2024-05-20T12:00:00Z".into(),
            fields: vec![
                ("position_x".into(), FieldValue::Float(10.5)),
                ("batteryLevel".into(), FieldValue::Int(0)),
                ("currentTask".into(), FieldValue::Str("say \"hi\"".into())),
                ("errorCode".into(), FieldValue::Null),
            ],
        }
    }

    #[test]
    fn point_takes_measurement_and_tag_from_schema() {
        let p = Point::from_event(&robot_event());
        assert_eq!(p.measurement, "robot_status");
        assert_eq!(p.tags, vec![("robot_id", "robot 001".to_string())]);
        assert_eq!(p.fields.len(), 4);
    }

    #[test]
    fn line_protocol_skips_nulls_and_escapes() {
        let line = Point::from_event(&robot_event()).to_line_protocol().unwrap();
        assert_eq!(
            line,
            "robot_status,robot_id=robot\\ 001 position_x=10.5,batteryLevel=0i,currentTask=\"say \\\"hi\\\"\" 1716206400000000000"
        );
    }

    #[test]
    fn all_null_point_is_not_written() {
        let mut ev = robot_event();
        ev.fields = vec![("errorCode".into(), FieldValue::Null)];
        assert_eq!(Point::from_event(&ev).to_line_protocol(), None);
    }

    #[test]
    fn whole_float_is_written_without_integer_suffix() {
        let mut ev = robot_event();
        ev.fields = vec![("position_z".into(), FieldValue::Float(37.0))];
        let line = Point::from_event(&ev).to_line_protocol().unwrap();
        assert!(line.contains(" position_z=37 "), "{line}");
    }

    type Seen = Arc<Mutex<Vec<(Option<String>, String)>>>;

    /// Local stand-in for the write endpoint answering every request with `status`.
    async fn stub_store(status: StatusCode) -> (StorageCfg, Seen) {
        async fn write(
            State((seen, status)): State<(Seen, StatusCode)>,
            headers: HeaderMap,
            body: String,
        ) -> (StatusCode, &'static str) {
            let auth = headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            seen.lock().unwrap().push((auth, body));
            (status, "field type conflict")
        }

        let seen = Seen::default();
        let app = Router::new()
            .route("/api/v2/write", post(write))
            .with_state((seen.clone(), status));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let cfg = StorageCfg {
            url: format!("http://{addr}"),
            token: "secret".into(),
            ..StorageCfg::default()
        };
        (cfg, seen)
    }

    #[tokio::test]
    async fn write_sends_token_and_line() {
        let (cfg, seen) = stub_store(StatusCode::NO_CONTENT).await;
        let sink = InfluxSink::new(&cfg).unwrap();

        sink.write(&Point::from_event(&robot_event())).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("Token secret"));
        assert!(seen[0].1.starts_with("robot_status,robot_id=robot\\ 001 "));
    }

    #[tokio::test]
    async fn rejected_write_is_a_storage_error() {
        let (cfg, _seen) = stub_store(StatusCode::BAD_REQUEST).await;
        let sink = InfluxSink::new(&cfg).unwrap();

        match sink.write(&Point::from_event(&robot_event())).await {
            Err(SinkError::StorageWrite(msg)) => {
                assert!(msg.contains("400"), "{msg}");
                assert!(msg.contains("field type conflict"), "{msg}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_null_point_sends_nothing() {
        let (cfg, seen) = stub_store(StatusCode::BAD_REQUEST).await;
        let sink = InfluxSink::new(&cfg).unwrap();

        let mut ev = robot_event();
        ev.fields = vec![("errorCode".into(), FieldValue::Null)];
        sink.write(&Point::from_event(&ev)).await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn write_url_carries_org_and_bucket() {
        let cfg = StorageCfg {
            url: "http://influx:8086/".into(),
            org: "my org".into(),
            bucket: "healthcare_data".into(),
            ..StorageCfg::default()
        };
        let sink = InfluxSink::new(&cfg).unwrap();
        assert_eq!(
            sink.write_url().as_str(),
            "http://influx:8086/api/v2/write?org=my+org&bucket=healthcare_data&precision=ns"
        );
    }
}
