//! Fixed-width field helpers shared by the record codecs

use crate::error::{Error, Result};

/// Read a NUL-padded string slot
pub(crate) fn read_str(slot: &[u8]) -> String {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    String::from_utf8_lossy(&slot[..end]).into_owned()
}

/// Write `value` into a NUL-padded slot of `width` bytes
pub(crate) fn write_str(out: &mut Vec<u8>, value: &str, width: usize, field: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(Error::Validation(format!(
            "{field} '{value}' is {} bytes, slot holds {width}",
            bytes.len()
        )));
    }
    out.extend_from_slice(bytes);
    out.resize(out.len() + width - bytes.len(), 0);
    Ok(())
}
