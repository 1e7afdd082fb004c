//! Visit counters embedded in signed tap messages.

/// Read the big-endian counter from the first four bytes of a hex message.
///
/// Returns `None` for anything that is not hex or is shorter than four bytes.
pub fn extract_counter_from_message(message: &str) -> Option<u32> {
    let prefix = message.trim().get(..8)?;
    let bytes = hex::decode(prefix).ok()?;
    let arr: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_be_bytes(arr))
}
