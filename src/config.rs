use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_TRAFFIC_URL: &str =
    "https://api.tomtom.com/traffic/services/4/flowSegmentData/absolute/10/json";

pub static CONFIG: once_cell::sync::Lazy<LocatorConfig> = once_cell::sync::Lazy::new(|| LocatorConfig::init());

pub struct LocatorConfig {
    pub host: String,
    pub port: u16,
    pub assets_dir: String,
    pub overpass_url: String,
    pub search_radius_meters: u32,
    pub traffic_url: String,
    /// Traffic advice is disabled when unset.
    pub traffic_api_key: Option<String>,
    pub http_timeout: Duration,
    pub loading_min: Duration,
    pub max_concurrent_sessions: usize,
}

impl LocatorConfig {
    pub fn init() -> LocatorConfig {
        LocatorConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or(env::var("PORT").ok(), 3000),
            assets_dir: env::var("ASSETS_DIR").unwrap_or_else(|_| "assets".to_string()),
            overpass_url: env::var("OVERPASS_URL").unwrap_or_else(|_| DEFAULT_OVERPASS_URL.to_string()),
            search_radius_meters: parse_or(env::var("SEARCH_RADIUS_METERS").ok(), 2000),
            traffic_url: env::var("TRAFFIC_URL").unwrap_or_else(|_| DEFAULT_TRAFFIC_URL.to_string()),
            traffic_api_key: env::var("TRAFFIC_API_KEY").ok().filter(|key| !key.is_empty()),
            http_timeout: Duration::from_secs(parse_or(env::var("HTTP_TIMEOUT_SECS").ok(), 10)),
            loading_min: Duration::from_millis(parse_or(env::var("LOADING_MIN_MILLIS").ok(), 2000)),
            max_concurrent_sessions: parse_or(env::var("MAX_CONCURRENT_SESSIONS").ok(), 10_000),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}
