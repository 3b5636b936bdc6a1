//! Raw device reports

use super::minute::ActivityMinute;
use super::steps::TimestampedStepsData;
use serde::{Deserialize, Serialize};

/// Mask for the 48 bits of a Bluetooth MAC address.
pub const MAC_ADDRESS_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcedUpdateError {
    MacAddressOutOfRange(u64),
}

impl std::fmt::Display for SourcedUpdateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourcedUpdateError::MacAddressOutOfRange(mac) => {
                write!(f, "MAC address {:#x} does not fit in 48 bits", mac)
            }
        }
    }
}

impl std::error::Error for SourcedUpdateError {}

/// One minute of activity as decoded from the device, tagged with the MAC
/// address of the peripheral that reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSourcedUpdate")]
pub struct SourcedUpdate {
    pub mac_address: u64,
    pub timestamp: ActivityMinute,
    pub walking_steps: u8,
    pub running_steps: u8,
}

impl SourcedUpdate {
    /// `mac_address` is truncated to its low 48 bits.
    pub fn new(mac_address: u64, timestamp: ActivityMinute, walking_steps: u8, running_steps: u8) -> Self {
        Self {
            mac_address: mac_address & MAC_ADDRESS_MASK,
            timestamp,
            walking_steps,
            running_steps,
        }
    }

    pub fn step_count(&self) -> u16 {
        self.walking_steps as u16 + self.running_steps as u16
    }
}

/// Wire shape of [`SourcedUpdate`] before the address is checked.
#[derive(Deserialize)]
struct RawSourcedUpdate {
    mac_address: u64,
    timestamp: ActivityMinute,
    walking_steps: u8,
    running_steps: u8,
}

impl TryFrom<RawSourcedUpdate> for SourcedUpdate {
    type Error = SourcedUpdateError;

    fn try_from(raw: RawSourcedUpdate) -> Result<Self, Self::Error> {
        if raw.mac_address > MAC_ADDRESS_MASK {
            return Err(SourcedUpdateError::MacAddressOutOfRange(raw.mac_address));
        }
        Ok(SourcedUpdate::new(
            raw.mac_address,
            raw.timestamp,
            raw.walking_steps,
            raw.running_steps,
        ))
    }
}

impl TimestampedStepsData for SourcedUpdate {
    fn timestamp(&self) -> i32 {
        self.timestamp.get() as i32
    }

    fn walking_step_count(&self) -> i64 {
        self.walking_steps as i64
    }

    fn running_step_count(&self) -> i64 {
        self.running_steps as i64
    }
}

/// Formats a 48-bit address as `aa:bb:cc:dd:ee:ff`.
pub fn format_mac_address(mac_address: u64) -> String {
    let bytes = (mac_address & MAC_ADDRESS_MASK).to_be_bytes();
    bytes[2..]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parses `aa:bb:cc:dd:ee:ff` (or the same without separators) into a 48-bit
/// address.
pub fn parse_mac_address(s: &str) -> Option<u64> {
    let hex: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
    if hex.len() != 12 {
        return None;
    }
    u64::from_str_radix(&hex, 16).ok()
}
