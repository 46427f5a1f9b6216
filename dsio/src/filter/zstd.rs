use super::{FilterError, FilterId, FilterTraits, FILTER_ZSTD};

/// The `zstd` filter.
///
/// The compression level is the first client data value reinterpreted as an `i32` if present, otherwise the zstd default.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZstdFilter;

impl FilterTraits for ZstdFilter {
    fn id(&self) -> FilterId {
        FILTER_ZSTD
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn encode(
        &self,
        bytes: Vec<u8>,
        client_data: &[u32],
        _element_size: usize,
    ) -> Result<Vec<u8>, FilterError> {
        let level = client_data
            .first()
            .map_or(zstd::DEFAULT_COMPRESSION_LEVEL, |level| {
                i32::from_ne_bytes(level.to_ne_bytes())
            });
        Ok(zstd::encode_all(bytes.as_slice(), level)?)
    }

    fn decode(
        &self,
        bytes: Vec<u8>,
        _client_data: &[u32],
        _element_size: usize,
    ) -> Result<Vec<u8>, FilterError> {
        Ok(zstd::decode_all(bytes.as_slice())?)
    }
}
