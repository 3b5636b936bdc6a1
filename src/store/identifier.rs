//! Record identifiers
//!
//! An `UpdateId` packs the full 64-bit MAC field and the full 32-bit minute
//! timestamp side by side, so no two `(timestamp, mac_address)` pairs share an
//! id. The timestamp's sign bit is flipped so that big-endian byte order sorts
//! the same way as `(mac_address as u64, timestamp)`.
//!
//! ```text
//! bits 95..32  mac_address (two's complement bits)
//! bits 31..0   timestamp ^ 0x8000_0000
//! ```

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

pub const UPDATE_ID_LEN: usize = 12;

const SIGN_FLIP: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpdateId(u128);

impl UpdateId {
    pub fn timestamp(self) -> i32 {
        ((self.0 as u32) ^ SIGN_FLIP) as i32
    }

    pub fn mac_address(self) -> i64 {
        (self.0 >> 32) as u64 as i64
    }

    pub fn to_bytes(self) -> [u8; UPDATE_ID_LEN] {
        let wide = self.0.to_be_bytes();
        let mut bytes = [0u8; UPDATE_ID_LEN];
        bytes.copy_from_slice(&wide[16 - UPDATE_ID_LEN..]);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != UPDATE_ID_LEN {
            return None;
        }
        let mut wide = [0u8; 16];
        wide[16 - UPDATE_ID_LEN..].copy_from_slice(bytes);
        Some(UpdateId(u128::from_be_bytes(wide)))
    }
}

/// Identifier for the record reported at `timestamp` by `mac_address`.
pub fn identifier(timestamp: i32, mac_address: i64) -> UpdateId {
    let high = (mac_address as u64 as u128) << 32;
    let low = ((timestamp as u32) ^ SIGN_FLIP) as u128;
    UpdateId(high | low)
}

/// The 64-bit key written by schema version 2. The MAC is XOR-folded to 32
/// bits and the timestamp is sign-extended into the high half, so distinct
/// pairs can share a value. Only used to audit legacy rows.
pub fn legacy_folded_identifier(timestamp: i32, mac_address: i64) -> i64 {
    let folded = (mac_address as i32) ^ ((mac_address >> 32) as i32);
    (timestamp as i64) | ((folded as i64) << 32)
}

impl std::fmt::Display for UpdateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:024x}", self.0)
    }
}

impl ToSql for UpdateId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_bytes().to_vec()))
    }
}

impl FromSql for UpdateId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let bytes = value.as_blob()?;
        UpdateId::from_bytes(bytes).ok_or(FromSqlError::InvalidBlobSize {
            expected_size: UPDATE_ID_LEN,
            blob_size: bytes.len(),
        })
    }
}
