//! Compact 32-bit storage codes for (source, datum) keys.
//!
//! ```text
//!  31        24 23                        0
//! ┌────────────┬───────────────────────────┐
//! │  source    │          datum            │
//! └────────────┴───────────────────────────┘
//! ```

use crate::error::{Result, SdbError};
use crate::store::{DatumId, SourceId};

/// Number of low bits holding the datum identifier.
pub const CODE_MASK_SIZE: u32 = 24;

/// Mask selecting the datum bits of a code.
pub const CODE_MASK: u32 = (1 << CODE_MASK_SIZE) - 1;

/// A packed storage code.
pub type Code = u32;

/// Packs a key into a storage code.
///
/// The result is decoded again and compared against the input, so IDs
/// that overflow their bit field are rejected rather than silently aliased.
///
/// # Errors
///
/// Returns [`SdbError::EncodeFailure`] if `source` needs more than
/// `32 - CODE_MASK_SIZE` bits or `datum` more than `CODE_MASK_SIZE` bits.
pub fn encode(source: SourceId, datum: DatumId) -> Result<Code> {
    let code = (source << CODE_MASK_SIZE) | (datum & CODE_MASK);
    if decode(code) != (source, datum) {
        return Err(SdbError::EncodeFailure {
            source_id: source,
            datum_id: datum,
        });
    }
    Ok(code)
}

/// Unpacks a storage code into its key.
pub fn decode(code: Code) -> (SourceId, DatumId) {
    ((code & !CODE_MASK) >> CODE_MASK_SIZE, code & CODE_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_layout() {
        assert_eq!(encode(0x0a, 0x1234).unwrap(), 0x0a00_1234);
        assert_eq!(decode(0x0a00_1234), (0x0a, 0x1234));
    }

    #[test]
    fn test_encode_rejects_wide_ids() {
        assert!(matches!(
            encode(0x100, 1),
            Err(SdbError::EncodeFailure { source_id: 0x100, .. })
        ));
        assert!(matches!(
            encode(1, 0x0100_0000),
            Err(SdbError::EncodeFailure { datum_id: 0x0100_0000, .. })
        ));
    }

    #[test]
    fn test_encode_extremes() {
        assert_eq!(encode(0xff, CODE_MASK).unwrap(), u32::MAX);
        assert_eq!(encode(0, 0).unwrap(), 0);
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(source in 0u32..256, datum in 0u32..(1 << 24)) {
            let code = encode(source, datum).unwrap();
            prop_assert_eq!(decode(code), (source, datum));
        }

        #[test]
        fn prop_encode_inverts_decode(code in any::<u32>()) {
            let (source, datum) = decode(code);
            prop_assert_eq!(encode(source, datum).unwrap(), code);
        }
    }
}
