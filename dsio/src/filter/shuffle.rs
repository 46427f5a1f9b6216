use super::{FilterError, FilterId, FilterTraits, FILTER_SHUFFLE};

/// The `shuffle` filter.
///
/// Transposes the bytes of fixed size elements so that byte `j` of every element is stored together.
/// This often improves the compression ratio of a subsequent compression filter.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShuffleFilter;

fn check_length(len: usize, element_size: usize) -> Result<(), FilterError> {
    if len.is_multiple_of(element_size) {
        Ok(())
    } else {
        Err(FilterError::Other(format!(
            "the shuffle filter expects the byte length {len} to be an integer multiple of the element size {element_size}"
        )))
    }
}

impl FilterTraits for ShuffleFilter {
    fn id(&self) -> FilterId {
        FILTER_SHUFFLE
    }

    fn name(&self) -> &'static str {
        "shuffle"
    }

    fn encode(
        &self,
        bytes: Vec<u8>,
        _client_data: &[u32],
        element_size: usize,
    ) -> Result<Vec<u8>, FilterError> {
        if element_size <= 1 {
            return Ok(bytes);
        }
        check_length(bytes.len(), element_size)?;
        let count = bytes.len() / element_size;
        let mut encoded = vec![0; bytes.len()];
        for (i, element) in bytes.chunks_exact(element_size).enumerate() {
            for (byte_index, byte) in element.iter().enumerate() {
                encoded[byte_index * count + i] = *byte;
            }
        }
        Ok(encoded)
    }

    fn decode(
        &self,
        bytes: Vec<u8>,
        _client_data: &[u32],
        element_size: usize,
    ) -> Result<Vec<u8>, FilterError> {
        if element_size <= 1 {
            return Ok(bytes);
        }
        check_length(bytes.len(), element_size)?;
        let count = bytes.len() / element_size;
        let mut decoded = vec![0; bytes.len()];
        for (i, element) in decoded.chunks_exact_mut(element_size).enumerate() {
            for (byte_index, byte) in element.iter_mut().enumerate() {
                *byte = bytes[byte_index * count + i];
            }
        }
        Ok(decoded)
    }
}
