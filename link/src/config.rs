//! Bridge configuration inputs.
//!
//! Consumed once at initialization. The filter key in particular can only
//! change by building a new bridge.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::frame::MacAddress;
use crate::radio::{MAX_CHANNEL, MIN_CHANNEL};
use crate::serial::SerialLine;

/// Default UART rate; leaves headroom for the peer's encryption overhead
pub const DEFAULT_BAUD_RATE: u32 = 460_800;

/// Default 2.4 GHz channel
pub const DEFAULT_CHANNEL: u8 = 11;

/// Default link identifier carried in addr3
pub const DEFAULT_FILTER_KEY: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x00]);

/// Default serial channel sizes
pub const DEFAULT_CHANNEL_CAPACITY: u32 = 1024;

/// Default tick period (100 Hz)
pub const DEFAULT_TICK_PERIOD_MS: u32 = 10;

/// Largest postcard encoding of a [`BridgeConfig`]
pub const CONFIG_BLOB_MAX: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct BridgeConfig {
    /// UART rate; framing is always 8N1
    pub baud_rate: u32,
    /// Radio channel 1-14
    pub channel: u8,
    /// Logical link identifier, sent as addr3 and matched on receive
    pub filter_key: MacAddress,
    /// Largest payload accepted in either direction
    pub max_payload: u16,
    /// Serial-inbound channel size (power of two)
    pub rx_capacity: u32,
    /// Serial-outbound channel size (power of two)
    pub tx_capacity: u32,
    /// Period of the reassembler tick
    pub tick_period_ms: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            channel: DEFAULT_CHANNEL,
            filter_key: DEFAULT_FILTER_KEY,
            max_payload: crate::DEFAULT_MAX_PAYLOAD as u16,
            rx_capacity: DEFAULT_CHANNEL_CAPACITY,
            tx_capacity: DEFAULT_CHANNEL_CAPACITY,
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
        }
    }
}

impl BridgeConfig {
    /// Check every field; `supported_payload` is the compiled buffer size
    pub fn validate(&self, supported_payload: usize) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate);
        }
        if !(MIN_CHANNEL..=MAX_CHANNEL).contains(&self.channel) {
            return Err(ConfigError::InvalidChannel(self.channel));
        }

        let supported = supported_payload.min(u16::MAX as usize) as u16;
        if self.max_payload == 0 || self.max_payload > supported {
            return Err(ConfigError::InvalidMaxPayload {
                requested: self.max_payload,
                supported,
            });
        }

        for capacity in [self.rx_capacity, self.tx_capacity] {
            if capacity < 2 || !capacity.is_power_of_two() {
                return Err(ConfigError::CapacityNotPowerOfTwo(capacity));
            }
        }

        if self.tick_period_ms == 0 {
            return Err(ConfigError::InvalidTickPeriod);
        }
        Ok(())
    }

    pub fn serial_line(&self) -> SerialLine {
        SerialLine::new_8n1(self.baud_rate)
    }

    /// Encode as a compact postcard blob
    pub fn to_slice<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], ConfigError> {
        Ok(postcard::to_slice(self, buf)?)
    }

    /// Encode into a fixed-capacity blob, e.g. for a flash record
    pub fn to_vec(&self) -> Result<Vec<u8, CONFIG_BLOB_MAX>, ConfigError> {
        Ok(postcard::to_vec(self)?)
    }

    /// Decode a postcard blob produced by [`Self::to_slice`] or [`Self::to_vec`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BridgeConfig::default();
        assert_eq!(config.baud_rate, 460_800);
        assert_eq!(config.channel, 11);
        assert_eq!(config.filter_key, DEFAULT_FILTER_KEY);
        assert_eq!(config.max_payload, 256);
        assert_eq!(config.validate(256), Ok(()));
    }

    #[test]
    fn test_validation_errors() {
        let base = BridgeConfig::default();

        let bad = BridgeConfig { channel: 15, ..base };
        assert_eq!(bad.validate(256), Err(ConfigError::InvalidChannel(15)));

        let bad = BridgeConfig { channel: 0, ..base };
        assert_eq!(bad.validate(256), Err(ConfigError::InvalidChannel(0)));

        let bad = BridgeConfig { max_payload: 0, ..base };
        assert!(matches!(
            bad.validate(256),
            Err(ConfigError::InvalidMaxPayload { requested: 0, .. })
        ));

        assert_eq!(
            base.validate(128),
            Err(ConfigError::InvalidMaxPayload {
                requested: 256,
                supported: 128
            })
        );

        let bad = BridgeConfig { rx_capacity: 1000, ..base };
        assert_eq!(bad.validate(256), Err(ConfigError::CapacityNotPowerOfTwo(1000)));

        let bad = BridgeConfig { baud_rate: 0, ..base };
        assert_eq!(bad.validate(256), Err(ConfigError::InvalidBaudRate));

        let bad = BridgeConfig { tick_period_ms: 0, ..base };
        assert_eq!(bad.validate(256), Err(ConfigError::InvalidTickPeriod));
    }

    #[test]
    fn test_config_blob() {
        let config = BridgeConfig {
            channel: 6,
            filter_key: MacAddress([1, 2, 3, 4, 5, 6]),
            ..BridgeConfig::default()
        };
        let mut buf = [0u8; CONFIG_BLOB_MAX];
        let blob = config.to_slice(&mut buf).unwrap();
        assert_eq!(BridgeConfig::from_bytes(blob).unwrap(), config);

        assert_eq!(BridgeConfig::from_bytes(&[0xFF]), Err(ConfigError::Encoding));
    }

    #[test]
    fn test_largest_config_fits_blob() {
        let config = BridgeConfig {
            baud_rate: u32::MAX,
            max_payload: u16::MAX,
            rx_capacity: u32::MAX,
            tx_capacity: u32::MAX,
            tick_period_ms: u32::MAX,
            ..BridgeConfig::default()
        };
        let blob = config.to_vec().unwrap();
        assert!(blob.len() <= CONFIG_BLOB_MAX);
        assert_eq!(BridgeConfig::from_bytes(&blob).unwrap(), config);
    }
}
