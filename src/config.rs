use std::env;
use std::fmt;
use time::Duration;
use url::Url;

use crate::control::context::DEFAULT_MAX_AGE;
use crate::control::{AdaptiveConfig, LimiterConfig};
use crate::models::CurvePoint;

const DEFAULT_BAUD: u32 = 115_200;
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_CLIENT_ID: &str = "evohome-mitm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Decode, log and forward every frame unchanged
    Observe,
    /// Additionally rewrite CH setpoint requests through the limiter
    Limit,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Observe => f.write_str("observe"),
            Mode::Limit => f.write_str("limit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerialConfig {
    pub device: String,
    pub baud: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub serial: SerialConfig,
    pub mqtt: MqttConfig,
    pub mode: Mode,
    pub ch_idle: f64,
    pub limiter: LimiterConfig,
    pub adaptive: AdaptiveConfig,
}

type ConfigResult<T> = Result<T, Box<dyn std::error::Error>>;

impl Config {
    pub fn new() -> ConfigResult<Self> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build and validate the configuration from a key -> value source
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| -> ConfigResult<String> {
            get(key).ok_or_else(|| format!("{} environment variable not set", key).into())
        };
        let number = |key: &str, value: String| -> ConfigResult<f64> {
            match value.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(format!("{} must be a number, got '{}'", key, value).into()),
            }
        };

        let serial = SerialConfig {
            device: required("SERIAL_DEVICE")?,
            baud: match get("SERIAL_BAUD") {
                Some(baud) => baud
                    .parse()
                    .map_err(|_| format!("SERIAL_BAUD must be an integer, got '{}'", baud))?,
                None => DEFAULT_BAUD,
            },
        };

        let (host, port) = parse_mqtt_url(&required("MQTT_URL")?)?;
        let mqtt = MqttConfig {
            host,
            port,
            client_id: get("MQTT_CLIENT_ID").unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
        };

        let mode = match get("MITM_MODE").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("observe") => Mode::Observe,
            Some("limit") => Mode::Limit,
            Some(other) => {
                return Err(format!("MITM_MODE must be 'observe' or 'limit', got '{}'", other).into())
            }
        };

        let ch_max = number("CH_MAX", required("CH_MAX")?)?;
        let ch_idle = number("CH_IDLE", required("CH_IDLE")?)?;
        let ramp_step = number("CH_RAMP_STEP", required("CH_RAMP_STEP")?)?;
        let ramp_interval = number("CH_RAMP_INTERVAL", required("CH_RAMP_INTERVAL")?)?;
        if ramp_step <= 0.0 {
            return Err("CH_RAMP_STEP must be greater than zero".into());
        }
        if ramp_interval < 0.0 {
            return Err("CH_RAMP_INTERVAL must not be negative".into());
        }

        let outdoor_max_age = match get("OUTDOOR_MAX_AGE") {
            Some(age) => {
                let age = number("OUTDOOR_MAX_AGE", age)?;
                if age < 0.0 {
                    return Err("OUTDOOR_MAX_AGE must not be negative".into());
                }
                Duration::seconds_f64(age)
            }
            None => DEFAULT_MAX_AGE,
        };

        let enabled = match get("CH_ADAPTIVE_ENABLED") {
            Some(flag) => parse_bool(&flag)
                .ok_or_else(|| format!("CH_ADAPTIVE_ENABLED must be true or false, got '{}'", flag))?,
            None => false,
        };
        let curve = match get("CH_ADAPTIVE_CURVE") {
            Some(curve) => parse_curve(&curve)?,
            None => Vec::new(),
        };
        if enabled && curve.is_empty() {
            return Err("CH_ADAPTIVE_ENABLED is set but CH_ADAPTIVE_CURVE is empty".into());
        }
        let adaptive_min = match get("CH_ADAPTIVE_MIN") {
            Some(v) => number("CH_ADAPTIVE_MIN", v)?,
            None => ch_idle,
        };
        let adaptive_max = match get("CH_ADAPTIVE_MAX") {
            Some(v) => number("CH_ADAPTIVE_MAX", v)?,
            None => ch_max,
        };
        if adaptive_min > adaptive_max {
            return Err(format!(
                "CH_ADAPTIVE_MIN ({}) is above CH_ADAPTIVE_MAX ({})",
                adaptive_min, adaptive_max
            )
            .into());
        }

        Ok(Config {
            serial,
            mqtt,
            mode,
            ch_idle,
            limiter: LimiterConfig {
                base_max: ch_max,
                ramp_step,
                ramp_interval: Duration::seconds_f64(ramp_interval),
                outdoor_max_age,
            },
            adaptive: AdaptiveConfig {
                enabled,
                curve,
                min: adaptive_min,
                max: adaptive_max,
            },
        })
    }
}

/// Parse `outdoor=ch_max` pairs, e.g. `-5=100,10=60,20=40`
///
/// The result is sorted by outdoor temperature.
pub fn parse_curve(spec: &str) -> Result<Vec<CurvePoint>, String> {
    let mut curve = Vec::new();
    for pair in spec.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (outdoor, ch_max) = pair
            .split_once('=')
            .ok_or_else(|| format!("Curve point '{}' is not of the form outdoor=ch_max", pair))?;
        let parse = |s: &str| {
            s.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("Curve point '{}' has a non-numeric value", pair))
        };
        curve.push(CurvePoint {
            outdoor_c: parse(outdoor)?,
            ch_max: parse(ch_max)?,
        });
    }
    curve.sort_by(|a, b| a.outdoor_c.total_cmp(&b.outdoor_c));
    Ok(curve)
}

/// Broker host and port from `mqtt://host[:port]`
pub fn parse_mqtt_url(raw: &str) -> Result<(String, u16), String> {
    let url = Url::parse(raw).map_err(|e| format!("MQTT_URL '{}' is invalid: {}", raw, e))?;
    if !matches!(url.scheme(), "mqtt" | "tcp") {
        return Err(format!("MQTT_URL scheme must be mqtt or tcp, got '{}'", url.scheme()));
    }
    let host = url
        .host_str()
        .ok_or_else(|| format!("MQTT_URL '{}' has no host", raw))?;
    Ok((host.to_string(), url.port().unwrap_or(DEFAULT_MQTT_PORT)))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SERIAL_DEVICE", "/dev/ttyACM0"),
            ("MQTT_URL", "mqtt://broker.local"),
            ("CH_MAX", "75"),
            ("CH_IDLE", "35"),
            ("CH_RAMP_STEP", "1.5"),
            ("CH_RAMP_INTERVAL", "60"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> ConfigResult<Config> {
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn minimal_environment_uses_defaults() {
        let config = load(&base()).unwrap();
        assert_eq!(config.serial.baud, 115_200);
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.client_id, "evohome-mitm");
        assert_eq!(config.mode, Mode::Observe);
        assert_eq!(config.limiter.base_max, 75.0);
        assert_eq!(config.limiter.ramp_interval, Duration::seconds(60));
        assert_eq!(config.limiter.outdoor_max_age, Duration::seconds(900));
        assert!(!config.adaptive.enabled);
        assert_eq!(config.adaptive.min, 35.0);
        assert_eq!(config.adaptive.max, 75.0);
    }

    #[test]
    fn adaptive_curve_is_sorted_at_load() {
        let mut vars = base();
        vars.insert("MITM_MODE", "Limit");
        vars.insert("MQTT_URL", "mqtt://10.0.0.2:1884");
        vars.insert("CH_ADAPTIVE_ENABLED", "true");
        vars.insert("CH_ADAPTIVE_CURVE", "20=40, -5=100,10=60");
        vars.insert("CH_ADAPTIVE_MIN", "40");

        let config = load(&vars).unwrap();
        assert_eq!(config.mode, Mode::Limit);
        assert_eq!(config.mqtt.port, 1884);
        let outdoor: Vec<f64> = config.adaptive.curve.iter().map(|p| p.outdoor_c).collect();
        assert_eq!(outdoor, vec![-5.0, 10.0, 20.0]);
        assert_eq!(config.adaptive.min, 40.0);
    }

    #[test]
    fn rejects_missing_and_invalid_values() {
        let mut vars = base();
        vars.remove("CH_MAX");
        assert!(load(&vars).is_err());

        let mut vars = base();
        vars.insert("CH_RAMP_STEP", "0");
        assert!(load(&vars).is_err());

        let mut vars = base();
        vars.insert("CH_ADAPTIVE_ENABLED", "true");
        assert!(load(&vars).is_err());

        let mut vars = base();
        vars.insert("CH_ADAPTIVE_MIN", "80");
        assert!(load(&vars).is_err());

        let mut vars = base();
        vars.insert("MITM_MODE", "aggressive");
        assert!(load(&vars).is_err());

        let mut vars = base();
        vars.insert("MQTT_URL", "http://broker");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn curve_parse_errors_name_the_point() {
        let err = parse_curve("-5=100,ten=60").unwrap_err();
        assert!(err.contains("ten=60"));
        assert!(parse_curve("-5:100").is_err());
        assert_eq!(parse_curve("").unwrap(), vec![]);
    }
}
