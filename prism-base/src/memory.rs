/// Rounds `size` up to the next multiple of `required_alignment`. Returns `None` if the rounded
/// size does not fit in a u32.
pub fn align_size_u32(
    size: u32,
    required_alignment: u32,
) -> Option<u32> {
    assert!(required_alignment > 0);
    let padded = size.checked_add(required_alignment - 1)?;
    Some((padded / required_alignment) * required_alignment)
}

/// Rounds `size` up to the next multiple of `required_alignment`. Returns `None` if the rounded
/// size does not fit in a u64.
pub fn align_size_u64(
    size: u64,
    required_alignment: u64,
) -> Option<u64> {
    assert!(required_alignment > 0);
    let padded = size.checked_add(required_alignment - 1)?;
    Some((padded / required_alignment) * required_alignment)
}

pub fn is_aligned_u64(
    value: u64,
    required_alignment: u64,
) -> bool {
    required_alignment != 0 && value % required_alignment == 0
}

pub fn slice_size_in_bytes<T>(slice: &[T]) -> usize {
    std::mem::size_of_val(slice)
}

/// Views a slice of plain data as raw bytes, used when uploading initial buffer contents
pub fn slice_as_bytes<T: Copy>(data: &[T]) -> &[u8] {
    let ptr = data.as_ptr() as *const u8;
    unsafe { std::slice::from_raw_parts(ptr, slice_size_in_bytes(data)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_size() {
        assert_eq!(align_size_u32(0, 64), Some(0));
        assert_eq!(align_size_u32(1, 64), Some(64));
        assert_eq!(align_size_u32(64, 64), Some(64));
        assert_eq!(align_size_u64(257, 256), Some(512));
        assert_eq!(align_size_u64(u64::MAX, 256), None);
        assert_eq!(align_size_u32(u32::MAX - 2, 4), None);
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned_u64(512, 256));
        assert!(!is_aligned_u64(100, 64));
        assert!(!is_aligned_u64(100, 0));
    }

    #[test]
    fn test_slice_as_bytes() {
        let values = [1u32, 2, 3];
        assert_eq!(slice_size_in_bytes(&values), 12);
        let bytes = slice_as_bytes(&values);
        assert_eq!(bytes.len(), 12);
        assert_eq!(u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 2);
    }
}
