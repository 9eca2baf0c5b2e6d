use async_trait::async_trait;
use tracing::{debug, info};

use bridge_core::{InfluxConfig, InsertRecord, PointSink, SinkError};

use crate::line_protocol::encode_point;

/// HTTP client writing single points to InfluxDB's `/write` endpoint.
///
/// Uses the 1.x write API (`db` + `precision=ns`), which InfluxDB 2.x also
/// serves through its compatibility layer when a token is configured.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    http: reqwest::Client,
    base_url: String,
    database: String,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SinkError::Http(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            token: config.token.clone(),
        })
    }

    /// Check that the server answers `GET /ping`.
    pub async fn ping(&self) -> Result<(), SinkError> {
        let url = format!("{}/ping", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SinkError::Http(format!("ping {url}: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Status { status, body });
        }
        info!(url = %self.base_url, database = %self.database, "influxdb reachable");
        Ok(())
    }

    /// POST a body of line protocol to the configured database.
    async fn write_lines(&self, body: String) -> Result<(), SinkError> {
        let url = format!("{}/write", self.base_url);
        let mut query: Vec<(&str, &str)> = vec![("db", self.database.as_str()), ("precision", "ns")];
        if let Some(user) = &self.username {
            query.push(("u", user.as_str()));
            query.push(("p", self.password.as_deref().unwrap_or("")));
        }

        let mut req = self.http.post(&url).query(&query).body(body);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Token {token}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| SinkError::Http(format!("write {url}: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Status { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl PointSink for InfluxSink {
    async fn write_point(&self, record: &InsertRecord) -> Result<(), SinkError> {
        let line = encode_point(record, &[])?;
        debug!(series = %record.series_path(), "writing point");
        self.write_lines(line).await
    }
}
