use std::ops::ControlFlow;

use crate::{
    element_type::ElementType,
    selection::{unravel_index, Dataspace},
};

use super::DatasetError;

/// Visit each selected element of `buffer` in selection order.
///
/// `buffer` holds the elements of the extent of `dataspace` in row-major order.
/// `callback` receives the bytes of each selected element and its coordinates.
/// Iteration stops early if `callback` returns [`ControlFlow::Break`], and the break value is returned.
///
/// # Errors
/// Returns [`DatasetError::BufferTooSmall`] if `buffer` does not hold the extent of `dataspace`.
pub fn iterate_selection<B>(
    buffer: &[u8],
    element_type: &ElementType,
    dataspace: &Dataspace,
    mut callback: impl FnMut(&[u8], &[u64]) -> ControlFlow<B>,
) -> Result<ControlFlow<B>, DatasetError> {
    let element_size = element_type.size();
    let dims = dataspace.extent().dims();
    let required = usize::try_from(dataspace.extent().num_elements())
        .ok()
        .and_then(|elements| elements.checked_mul(element_size));
    if required.map_or(true, |required| buffer.len() < required) {
        return Err(DatasetError::BufferTooSmall(format!(
            "the extent {dims:?} of {element_type} does not fit in {} bytes",
            buffer.len()
        )));
    }

    for run in dataspace.iter() {
        for index in run.offset..run.end() {
            // the buffer holds the extent
            let start = index as usize * element_size;
            let coordinates = unravel_index(index, dims);
            if let ControlFlow::Break(value) =
                callback(&buffer[start..start + element_size], &coordinates)
            {
                return Ok(ControlFlow::Break(value));
            }
        }
    }
    Ok(ControlFlow::Continue(()))
}
