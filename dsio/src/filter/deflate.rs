use std::io::{Cursor, Read};

use crate::config::global_config;

use super::{FilterError, FilterId, FilterTraits, FILTER_DEFLATE};

/// The `deflate` filter.
///
/// Compresses with zlib.
/// The compression level is the first client data value if present, otherwise the [deflate level](crate::config::Config::deflate_level) configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeflateFilter;

impl FilterTraits for DeflateFilter {
    fn id(&self) -> FilterId {
        FILTER_DEFLATE
    }

    fn name(&self) -> &'static str {
        "deflate"
    }

    fn encode(
        &self,
        bytes: Vec<u8>,
        client_data: &[u32],
        _element_size: usize,
    ) -> Result<Vec<u8>, FilterError> {
        let level = client_data
            .first()
            .copied()
            .unwrap_or_else(|| global_config().deflate_level());
        if level > 9 {
            return Err(FilterError::Other(format!(
                "deflate level {level} is not in the range 0-9"
            )));
        }
        let mut encoder =
            flate2::read::ZlibEncoder::new(Cursor::new(bytes), flate2::Compression::new(level));
        let mut out: Vec<u8> = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(out)
    }

    fn decode(
        &self,
        bytes: Vec<u8>,
        _client_data: &[u32],
        _element_size: usize,
    ) -> Result<Vec<u8>, FilterError> {
        let mut decoder = flate2::read::ZlibDecoder::new(Cursor::new(bytes));
        let mut out: Vec<u8> = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}
