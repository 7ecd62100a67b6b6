//! JSON configuration files.
//!
//! Missing fields take the device defaults:
//!
//! ```json
//! { "channel": 6, "filter_key": "AA:BB:CC:DD:EE:01" }
//! ```

use std::fs;
use std::path::Path;

use log::info;
use rawlink::{BridgeConfig, DEFAULT_MAX_PAYLOAD};

use crate::error::HostError;

/// Parse and validate a JSON configuration
pub fn parse(text: &str) -> Result<BridgeConfig, HostError> {
    let config: BridgeConfig = serde_json::from_str(text)?;
    config.validate(DEFAULT_MAX_PAYLOAD)?;
    Ok(config)
}

/// Load a configuration file
pub fn load(path: impl AsRef<Path>) -> Result<BridgeConfig, HostError> {
    let path = path.as_ref();
    let config = parse(&fs::read_to_string(path)?)?;
    info!(
        "Loaded {}: channel {}, link {}",
        path.display(),
        config.channel,
        config.filter_key
    );
    Ok(config)
}

/// Render a configuration as pretty JSON
pub fn to_json(config: &BridgeConfig) -> Result<String, HostError> {
    Ok(serde_json::to_string_pretty(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawlink::{ConfigError, MacAddress};

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = parse(r#"{ "channel": 6, "filter_key": "01:02:03:04:05:06" }"#).unwrap();
        assert_eq!(config.channel, 6);
        assert_eq!(config.filter_key, MacAddress([1, 2, 3, 4, 5, 6]));
        assert_eq!(config.baud_rate, 460_800);
        assert_eq!(config.max_payload, 256);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            parse(r#"{ "channel": 15 }"#),
            Err(HostError::Config(ConfigError::InvalidChannel(15)))
        ));
        assert!(matches!(
            parse(r#"{ "filter_key": "not-a-mac" }"#),
            Err(HostError::Json(_))
        ));
    }

    #[test]
    fn test_json_output_reloads() {
        let config = BridgeConfig {
            channel: 3,
            ..BridgeConfig::default()
        };
        let text = to_json(&config).unwrap();
        assert!(text.contains("\"AA:BB:CC:DD:EE:00\""));
        assert_eq!(parse(&text).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("rawlink-config-{}.json", std::process::id()));
        fs::write(&path, r#"{ "tick_period_ms": 5 }"#).unwrap();
        let config = load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.tick_period_ms, 5);

        assert!(matches!(load(&path), Err(HostError::Io(_))));
    }
}
