//! InfluxDB 1.x adapter for power samples and room conditions
//!
//! Home Assistant writes each sensor unit as its own measurement (`"W"`,
//! `"°C"`, `"%"`, `"hPa"`) tagged with `entity_id`. Queries go through the
//! `/query` HTTP endpoint with millisecond epochs.

use crate::core::{EnvironmentalConditions, Error, InfluxConfig, PowerSample, Result};
use crate::scheduler::{ConditionSource, SampleSource};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

const TEMPERATURE_MEASUREMENT: &str = "\u{b0}C";
const HUMIDITY_MEASUREMENT: &str = "%";
const PRESSURE_MEASUREMENT: &str = "hPa";

/// Time-series client
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: Client,
    config: InfluxConfig,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl InfluxClient {
    pub fn new(config: &InfluxConfig) -> Self {
        Self {
            http: Client::new(),
            config: config.clone(),
        }
    }

    async fn query(&self, q: &str) -> Result<Vec<(i64, f64)>> {
        let url = format!("{}/query", self.config.url.trim_end_matches('/'));
        let mut request = self.http.get(&url).query(&[
            ("db", self.config.database.as_str()),
            ("q", q),
            ("epoch", "ms"),
        ]);
        if let Some(user) = &self.config.username {
            request = request.basic_auth(user, self.config.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Query(format!("InfluxDB HTTP {}: {}", status, body.trim())));
        }

        parse_points(&body)
    }

    fn power_query(&self, entity_id: &str, since: DateTime<Utc>) -> String {
        format!(
            "SELECT value FROM {} WHERE entity_id = '{}' AND time >= '{}' ORDER BY time ASC",
            quote_identifier(&self.config.power_measurement),
            escape_literal(entity_id),
            since.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    async fn latest(&self, measurement: &str, entity_id: &str) -> Result<Option<f64>> {
        let q = format!(
            "SELECT value FROM {} WHERE entity_id = '{}' ORDER BY time DESC LIMIT 1",
            quote_identifier(measurement),
            escape_literal(entity_id)
        );
        Ok(self.query(&q).await?.first().map(|&(_, v)| v))
    }
}

impl SampleSource for InfluxClient {
    async fn power_samples(&self, entity_id: &str, since: DateTime<Utc>) -> Result<Vec<PowerSample>> {
        let points = self.query(&self.power_query(entity_id, since)).await?;

        let samples = points
            .into_iter()
            .filter_map(|(ms, watts)| {
                let ts = Utc.timestamp_millis_opt(ms).single()?;
                Some(PowerSample::new(ts, watts))
            })
            .collect();
        Ok(samples)
    }
}

impl ConditionSource for InfluxClient {
    /// Temperature and humidity are both required; pressure is optional
    async fn latest_conditions(&self, sensor_id: &str) -> Result<Option<EnvironmentalConditions>> {
        let temperature_id = format!("{}_temperature", sensor_id);
        let humidity_id = format!("{}_humidity", sensor_id);
        let pressure_id = format!("{}_pressure", sensor_id);

        let (temperature, humidity, pressure) = tokio::join!(
            self.latest(TEMPERATURE_MEASUREMENT, &temperature_id),
            self.latest(HUMIDITY_MEASUREMENT, &humidity_id),
            self.latest(PRESSURE_MEASUREMENT, &pressure_id),
        );

        let pressure = pressure.unwrap_or_else(|e| {
            log::debug!("No pressure for {}: {}", sensor_id, e);
            None
        });

        match (temperature?, humidity?) {
            (Some(t), Some(h)) => Ok(Some(EnvironmentalConditions::new(t, h, pressure))),
            _ => Ok(None),
        }
    }
}

/// (epoch ms, value) pairs from a `/query` response body
fn parse_points(body: &str) -> Result<Vec<(i64, f64)>> {
    let response: QueryResponse = serde_json::from_str(body)?;
    if let Some(err) = response.error {
        return Err(Error::Query(err));
    }

    let mut points = Vec::new();
    for statement in response.results {
        if let Some(err) = statement.error {
            return Err(Error::Query(err));
        }
        for series in statement.series {
            let time_idx = series.columns.iter().position(|c| c == "time");
            let value_idx = series.columns.iter().position(|c| c == "value");
            let (Some(ti), Some(vi)) = (time_idx, value_idx) else {
                continue;
            };

            points.extend(series.values.iter().filter_map(|row| {
                let ms = row.get(ti)?.as_i64()?;
                let value = row.get(vi)?.as_f64()?;
                value.is_finite().then_some((ms, value))
            }));
        }
    }
    Ok(points)
}

fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn quote_identifier(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_series() {
        let body = r#"{"results":[{"statement_id":0,"series":[{"name":"W","columns":["time","value"],
            "values":[[1709546400000,12.5],[1709546410000,null],[1709546420000,2000]]}]}]}"#;
        let points = parse_points(body).unwrap();
        assert_eq!(points, vec![(1709546400000, 12.5), (1709546420000, 2000.0)]);
    }

    #[test]
    fn test_empty_result_is_no_points() {
        let body = r#"{"results":[{"statement_id":0}]}"#;
        assert!(parse_points(body).unwrap().is_empty());
    }

    #[test]
    fn test_statement_error_is_query_error() {
        let body = r#"{"results":[{"statement_id":0,"error":"database not found: x"}]}"#;
        assert!(matches!(parse_points(body), Err(Error::Query(_))));
    }

    #[test]
    fn test_query_escaping() {
        let client = InfluxClient::new(&InfluxConfig::default());
        let since = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let q = client.power_query("sensor.o'brien_power", since);
        assert_eq!(
            q,
            "SELECT value FROM \"W\" WHERE entity_id = 'sensor.o\\'brien_power' AND time >= '2024-03-04T00:00:00Z' ORDER BY time ASC"
        );
    }
}
