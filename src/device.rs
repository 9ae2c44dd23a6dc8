use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OpenFlow `OFPP_NONE`: asks the switch for every port in one reply.
pub const OFPP_NONE: u16 = 0xffff;

/// A switch datapath id.
///
/// Displays in the controller's colon-separated hex form
/// (`00:00:00:00:00:00:00:01`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u64);

impl DeviceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for DeviceId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        for (idx, byte) in bytes.iter().enumerate() {
            if idx > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for DeviceId {
    type Err = anyhow::Error;

    /// Accepts `00:00:00:00:00:00:00:01`, `0x1` or plain decimal.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty device id");
        }
        if s.contains(':') {
            let mut raw: u64 = 0;
            let mut octets = 0;
            for part in s.split(':') {
                if part.is_empty() || part.len() > 2 {
                    bail!("invalid octet '{part}' in device id '{s}'");
                }
                let octet = u8::from_str_radix(part, 16)
                    .map_err(|err| anyhow!("invalid octet '{part}' in device id '{s}': {err}"))?;
                octets += 1;
                if octets > 8 {
                    bail!("device id '{s}' has more than 8 octets");
                }
                raw = (raw << 8) | u64::from(octet);
            }
            return Ok(Self(raw));
        }
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let raw = u64::from_str_radix(hex, 16)
                .map_err(|err| anyhow!("invalid hex device id '{s}': {err}"))?;
            return Ok(Self(raw));
        }
        let raw = s
            .parse::<u64>()
            .map_err(|err| anyhow!("invalid device id '{s}': {err}"))?;
        Ok(Self(raw))
    }
}

/// One entry of a port statistics reply.
///
/// Fields the controller leaves out are treated as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortCounters {
    pub port: u16,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_frame_errors: u64,
    pub rx_overrun_errors: u64,
    pub rx_crc_errors: u64,
    pub collisions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsType {
    Port,
}

/// The statistics request sent to a switch on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStatsRequest {
    pub stats_type: StatsType,
    pub port: u16,
}

/// Builds the single request the recorder ever issues: port stats for all ports.
pub fn port_stats_request() -> PortStatsRequest {
    PortStatsRequest {
        stats_type: StatsType::Port,
        port: OFPP_NONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_colon_hex() {
        assert_eq!(DeviceId::new(1).to_string(), "00:00:00:00:00:00:00:01");
        assert_eq!(
            DeviceId::new(0x0a0b_0c0d_0e0f_1011).to_string(),
            "0a:0b:0c:0d:0e:0f:10:11"
        );
    }

    #[test]
    fn parses_all_accepted_forms() {
        let expected = DeviceId::new(0x1f);
        assert_eq!("00:00:00:00:00:00:00:1f".parse::<DeviceId>().unwrap(), expected);
        assert_eq!("0x1f".parse::<DeviceId>().unwrap(), expected);
        assert_eq!("31".parse::<DeviceId>().unwrap(), expected);
    }

    #[test]
    fn display_parses_back() {
        let id = DeviceId::new(u64::MAX - 7);
        assert_eq!(id.to_string().parse::<DeviceId>().unwrap(), id);
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<DeviceId>().is_err());
        assert!("zz:01".parse::<DeviceId>().is_err());
        assert!("00:00:00:00:00:00:00:00:01".parse::<DeviceId>().is_err());
        assert!("0xnope".parse::<DeviceId>().is_err());
    }

    #[test]
    fn request_targets_every_port() {
        let req = port_stats_request();
        assert_eq!(req.stats_type, StatsType::Port);
        assert_eq!(req.port, OFPP_NONE);
    }

    #[test]
    fn missing_counters_default_to_zero() {
        let counters: PortCounters = serde_json::from_str(r#"{"port": 3, "rx_packets": 7}"#).unwrap();
        assert_eq!(counters.port, 3);
        assert_eq!(counters.rx_packets, 7);
        assert_eq!(counters.tx_packets, 0);
        assert_eq!(counters.collisions, 0);
    }
}
