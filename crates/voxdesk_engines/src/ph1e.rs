#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use voxdesk_kernel_contracts::ph1e::{
    EventRecord, ServiceError, ServiceErrorKind, TaskRecord, WeatherReport,
};
use voxdesk_kernel_contracts::Validate;

/// Task list kept in process memory. Adding an identical record twice keeps one entry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskBoard {
    tasks: Vec<TaskRecord>,
}

impl InMemoryTaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, task: TaskRecord) -> Result<String, ServiceError> {
        task.validate()?;
        if self.tasks.contains(&task) {
            tracing::debug!(name = %task.name, "task already on board");
        } else {
            self.tasks.push(task);
        }
        Ok("Task added successfully!".to_string())
    }

    pub fn list(&self) -> Vec<TaskRecord> {
        self.tasks.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryEventCalendar {
    events: Vec<EventRecord>,
}

impl InMemoryEventCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: EventRecord) -> Result<String, ServiceError> {
        event.validate()?;
        if !self.events.contains(&event) {
            self.events.push(event);
        }
        Ok("Event added to your calendar.".to_string())
    }

    /// Events with a resolved time come first in chronological order, then the rest
    /// in insertion order.
    pub fn list(&self) -> Vec<EventRecord> {
        let mut out = self.events.clone();
        out.sort_by_key(|e| (e.resolved_at.is_none(), e.resolved_at));
        out
    }
}

/// Canned weather reports for running without network access.
#[derive(Debug, Clone, Default)]
pub struct OfflineWeather {
    reports: BTreeMap<String, String>,
    fallback: Option<String>,
}

impl OfflineWeather {
    pub fn mvp_v1() -> Self {
        Self {
            reports: BTreeMap::new(),
            fallback: Some("no live forecast is available in offline mode".to_string()),
        }
    }

    pub fn with_report(mut self, location: &str, text: &str) -> Self {
        self.reports
            .insert(location.trim().to_lowercase(), text.to_string());
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    pub fn lookup(&self, location: &str) -> Result<WeatherReport, ServiceError> {
        let key = location.trim().to_lowercase();
        let text = self
            .reports
            .get(&key)
            .or(self.fallback.as_ref())
            .ok_or_else(|| ServiceError::not_found(format!("no offline report for {location}")))?;
        Ok(WeatherReport::v1(location.trim(), format!("{}: {text}.", location.trim()))?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenMeteoConfig {
    pub geocoding_endpoint: String,
    pub forecast_endpoint: String,
    pub timeout_ms: u32,
    pub user_agent: String,
}

impl OpenMeteoConfig {
    pub fn mvp_v1() -> Self {
        Self {
            geocoding_endpoint: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
            forecast_endpoint: "https://api.open-meteo.com/v1/forecast".to_string(),
            timeout_ms: 4_000,
            user_agent: "voxdesk/0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoPlace {
    pub name: String,
    pub country: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPlace {
    pub fn display_name(&self) -> String {
        match &self.country {
            Some(c) => format!("{}, {c}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Live weather via the Open-Meteo geocoding and forecast APIs.
#[derive(Debug, Clone)]
pub struct OpenMeteoWeather {
    config: OpenMeteoConfig,
    agent: ureq::Agent,
}

impl OpenMeteoWeather {
    pub fn new(config: OpenMeteoConfig) -> Result<Self, ServiceError> {
        if config.timeout_ms == 0 {
            return Err(ServiceError::rejected("open-meteo timeout must be > 0"));
        }
        let timeout = Duration::from_millis(u64::from(config.timeout_ms).max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(&config.user_agent)
            .build();
        Ok(Self { config, agent })
    }

    pub fn lookup(&self, location: &str) -> Result<WeatherReport, ServiceError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ServiceError::rejected("location must not be empty"));
        }
        let geo = self.get_json(
            &self.config.geocoding_endpoint,
            &[("name", location), ("count", "1"), ("language", "en"), ("format", "json")],
        )?;
        let place = parse_geocode(&geo)
            .ok_or_else(|| ServiceError::not_found(format!("unknown location: {location}")))?;

        let latitude = place.latitude.to_string();
        let longitude = place.longitude.to_string();
        let forecast = self.get_json(
            &self.config.forecast_endpoint,
            &[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("current", "temperature_2m,weather_code,wind_speed_10m"),
            ],
        )?;
        let text = describe_current(&place, &forecast).ok_or_else(|| {
            ServiceError::new(
                ServiceErrorKind::Internal,
                "forecast response has no current conditions",
            )
        })?;
        tracing::debug!(location, place = %place.display_name(), "weather resolved");
        Ok(WeatherReport::v1(place.display_name(), text)?)
    }

    fn get_json(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value, ServiceError> {
        let mut request = self.agent.get(endpoint).set("Accept", "application/json");
        for (k, v) in query {
            request = request.query(k, v);
        }
        let response = request.call().map_err(service_error_from_ureq)?;
        response.into_json::<Value>().map_err(|e| {
            ServiceError::new(ServiceErrorKind::Internal, format!("json parse: {e}"))
        })
    }
}

/// Transport trouble, timeouts, 429 and 5xx are retryable; other statuses are not.
pub fn service_error_from_ureq(err: ureq::Error) -> ServiceError {
    match err {
        ureq::Error::Status(429, _) => {
            ServiceError::new(ServiceErrorKind::RateLimited, "http 429")
        }
        ureq::Error::Status(status, _) if status >= 500 => {
            ServiceError::new(ServiceErrorKind::Unavailable, format!("http {status}"))
        }
        ureq::Error::Status(404, _) => ServiceError::not_found("http 404"),
        ureq::Error::Status(status, _) => ServiceError::rejected(format!("http {status}")),
        ureq::Error::Transport(transport) => {
            let detail = format!("{:?} {}", transport.kind(), transport);
            if detail.to_ascii_lowercase().contains("timeout")
                || detail.to_ascii_lowercase().contains("timed out")
            {
                ServiceError::new(ServiceErrorKind::Timeout, detail)
            } else {
                ServiceError::network(detail)
            }
        }
    }
}

pub fn parse_geocode(body: &Value) -> Option<GeoPlace> {
    let first = body.get("results")?.as_array()?.first()?;
    Some(GeoPlace {
        name: first.get("name")?.as_str()?.to_string(),
        country: first
            .get("country")
            .and_then(Value::as_str)
            .map(str::to_string),
        latitude: first.get("latitude")?.as_f64()?,
        longitude: first.get("longitude")?.as_f64()?,
    })
}

/// WMO weather interpretation codes.
pub fn weather_code_text(code: i64) -> &'static str {
    match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 | 48 => "fog",
        51..=57 => "drizzle",
        61..=67 => "rain",
        71..=77 => "snow",
        80..=82 => "rain showers",
        85 | 86 => "snow showers",
        95..=99 => "thunderstorm",
        _ => "unsettled weather",
    }
}

pub fn describe_current(place: &GeoPlace, body: &Value) -> Option<String> {
    let current = body.get("current")?;
    let temperature = current.get("temperature_2m")?.as_f64()?;
    let code = current.get("weather_code").and_then(Value::as_i64);
    let unit = body
        .get("current_units")
        .and_then(|u| u.get("temperature_2m"))
        .and_then(Value::as_str)
        .unwrap_or("°C");
    let mut text = format!(
        "{}: {}, {temperature:.0}{unit}",
        place.display_name(),
        code.map_or("conditions unknown", weather_code_text)
    );
    if let Some(wind) = current.get("wind_speed_10m").and_then(Value::as_f64) {
        text.push_str(&format!(", wind {wind:.0} km/h"));
    }
    text.push('.');
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use voxdesk_kernel_contracts::ph1n::Priority;

    #[test]
    fn at_e_01_task_board_add_is_idempotent() {
        let mut board = InMemoryTaskBoard::new();
        let t = TaskRecord::v1("buy groceries", "General", Priority::Normal).unwrap();
        board.add(t.clone()).unwrap();
        board.add(t.clone()).unwrap();
        assert_eq!(board.list(), vec![t]);
    }

    #[test]
    fn at_e_02_calendar_lists_resolved_events_first() {
        let mut cal = InMemoryEventCalendar::new();
        let later = chrono::NaiveDate::from_ymd_opt(2026, 3, 6)
            .unwrap()
            .and_hms_opt(9, 0, 0);
        let sooner = chrono::NaiveDate::from_ymd_opt(2026, 3, 5)
            .unwrap()
            .and_hms_opt(15, 0, 0);
        let loose = EventRecord::v1("lunch", "next week", None, Priority::Low).unwrap();
        let a = EventRecord::v1("standup", "friday at 9am", later, Priority::Normal).unwrap();
        let b = EventRecord::v1("review", "tomorrow at 3pm", sooner, Priority::High).unwrap();
        cal.add(loose.clone()).unwrap();
        cal.add(a.clone()).unwrap();
        cal.add(b.clone()).unwrap();
        cal.add(b.clone()).unwrap();
        assert_eq!(cal.list(), vec![b, a, loose]);
    }

    #[test]
    fn at_e_03_offline_weather_table_and_fallback() {
        let w = OfflineWeather::mvp_v1().with_report("Paris", "sunny, 21°C");
        assert_eq!(w.lookup(" paris ").unwrap().text, "paris: sunny, 21°C.");
        assert!(w.lookup("Oslo").unwrap().text.contains("offline"));
        let strict = OfflineWeather::mvp_v1().without_fallback();
        assert_eq!(
            strict.lookup("Oslo").unwrap_err().kind,
            ServiceErrorKind::NotFound
        );
    }

    #[test]
    fn at_e_04_geocode_and_current_conditions_parse() {
        let geo: Value = serde_json::from_str(
            r#"{"results":[{"name":"Paris","latitude":48.85,"longitude":2.35,"country":"France"}]}"#,
        )
        .unwrap();
        let place = parse_geocode(&geo).unwrap();
        assert_eq!(place.display_name(), "Paris, France");

        let forecast: Value = serde_json::from_str(
            r#"{"current_units":{"temperature_2m":"°C"},
                "current":{"temperature_2m":12.4,"weather_code":2,"wind_speed_10m":9.6}}"#,
        )
        .unwrap();
        assert_eq!(
            describe_current(&place, &forecast).unwrap(),
            "Paris, France: partly cloudy, 12°C, wind 10 km/h."
        );
    }

    #[test]
    fn at_e_05_unknown_location_has_no_geocode() {
        let geo: Value = serde_json::from_str(r#"{"generationtime_ms":0.5}"#).unwrap();
        assert!(parse_geocode(&geo).is_none());
        let place = GeoPlace {
            name: "Nowhere".to_string(),
            country: None,
            latitude: 0.0,
            longitude: 0.0,
        };
        assert!(describe_current(&place, &geo).is_none());
    }

    #[test]
    fn at_e_06_http_status_maps_to_retry_class() {
        let status = |code: u16| {
            ureq::Error::Status(code, ureq::Response::new(code, "status", "").unwrap())
        };
        assert_eq!(
            service_error_from_ureq(status(503)).kind,
            ServiceErrorKind::Unavailable
        );
        assert_eq!(
            service_error_from_ureq(status(429)).kind,
            ServiceErrorKind::RateLimited
        );
        assert_eq!(
            service_error_from_ureq(status(400)).kind,
            ServiceErrorKind::Rejected
        );
        assert_eq!(
            service_error_from_ureq(status(404)).kind,
            ServiceErrorKind::NotFound
        );
    }

    #[test]
    fn at_e_07_zero_timeout_is_rejected() {
        let cfg = OpenMeteoConfig {
            timeout_ms: 0,
            ..OpenMeteoConfig::mvp_v1()
        };
        assert!(OpenMeteoWeather::new(cfg).is_err());
    }
}
