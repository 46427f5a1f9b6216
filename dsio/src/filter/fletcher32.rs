use crate::config::global_config;

use super::{FilterError, FilterId, FilterTraits, FILTER_FLETCHER32};

/// The `fletcher32` filter.
///
/// Appends a 4 byte little-endian Fletcher-32 checksum of the data on encode.
/// The checksum is validated on decode if [`Config::validate_checksums`](crate::config::Config::validate_checksums) is enabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fletcher32Filter;

const CHECKSUM_SIZE: usize = size_of::<u32>();

/// Compute the Fletcher-32 checksum of `data`.
///
/// The data is summed as big-endian 16-bit words, with an odd trailing byte treated as the high byte of a final word.
#[must_use]
pub fn fletcher32(data: &[u8]) -> u32 {
    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum1 = (sum1 + u32::from(u16::from_be_bytes([word[0], word[1]]))) % 65535;
        sum2 = (sum2 + sum1) % 65535;
    }
    if let [byte] = words.remainder() {
        sum1 = (sum1 + (u32::from(*byte) << 8)) % 65535;
        sum2 = (sum2 + sum1) % 65535;
    }
    (sum2 << 16) | sum1
}

impl FilterTraits for Fletcher32Filter {
    fn id(&self) -> FilterId {
        FILTER_FLETCHER32
    }

    fn name(&self) -> &'static str {
        "fletcher32"
    }

    fn encode(
        &self,
        mut bytes: Vec<u8>,
        _client_data: &[u32],
        _element_size: usize,
    ) -> Result<Vec<u8>, FilterError> {
        let checksum = fletcher32(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        Ok(bytes)
    }

    fn decode(
        &self,
        mut bytes: Vec<u8>,
        _client_data: &[u32],
        _element_size: usize,
    ) -> Result<Vec<u8>, FilterError> {
        let Some(data_len) = bytes.len().checked_sub(CHECKSUM_SIZE) else {
            return Err(FilterError::Truncated(bytes.len()));
        };
        if global_config().validate_checksums() {
            let (data, stored) = bytes.split_at(data_len);
            let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
            let computed = fletcher32(data);
            if stored != computed {
                return Err(FilterError::ChecksumMismatch { stored, computed });
            }
        }
        bytes.truncate(data_len);
        Ok(bytes)
    }
}
