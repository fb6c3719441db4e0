//! XOR stream cipher used for encrypted capture versions

/// XOR `data` with the repeating `key`.
///
/// The operation is its own inverse. An empty key returns the data unchanged.
#[must_use]
pub fn xor_stream(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}
