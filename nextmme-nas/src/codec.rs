//! NAS information element encoding/decoding
//!
//! Information elements are written to and read from plain byte slices. An
//! element is framed as `IEI | value`; passing an IEI of `0` means the
//! element is carried without its IEI (value part only), as done for
//! mandatory elements of a message.
//!
//! # Example
//!
//! ```rust
//! use nextmme_nas::codec::InformationElement3;
//! use nextmme_nas::ies::{DrxParameter, DRX_PARAMETER_IEI};
//!
//! let drx = DrxParameter::new(0x0A, 6, true, 0);
//! let mut buf = [0u8; DrxParameter::MAX_LENGTH];
//! let written = drx.encode(DRX_PARAMETER_IEI, &mut buf).unwrap();
//! assert_eq!(&buf[..written], &[0x5C, 0x0A, 0x68]);
//!
//! let decoded = DrxParameter::decode(DRX_PARAMETER_IEI, &buf).unwrap();
//! assert_eq!(decoded, drx);
//! ```

use thiserror::Error;

/// Errors that can occur during NAS encoding/decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input shorter than the element's minimum length
    #[error("Malformed input: expected at least {expected_min} bytes, got {actual}")]
    MalformedInput {
        /// Minimum number of bytes
        expected_min: usize,
        /// Bytes available
        actual: usize,
    },

    /// Output buffer cannot hold the encoded element
    #[error("Buffer too small: {required} bytes required, {available} available")]
    BufferTooSmall {
        /// Bytes the element needs
        required: usize,
        /// Bytes in the buffer
        available: usize,
    },

    /// Leading octet is not the expected IEI
    #[error("IEI mismatch: expected 0x{expected:02X}, found 0x{found:02X}")]
    IeiMismatch {
        /// IEI the caller asked for
        expected: u8,
        /// Octet found in the buffer
        found: u8,
    },
}

/// Result type for NAS codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Fixed-length (type 3) information element.
///
/// `MIN_LENGTH` and `MAX_LENGTH` count the IEI octet.
pub trait InformationElement3: Sized {
    /// Minimum encoded length including the IEI
    const MIN_LENGTH: usize;
    /// Maximum encoded length including the IEI
    const MAX_LENGTH: usize;

    /// Encodes the element into `buf` and returns the number of bytes written.
    fn encode(&self, iei: u8, buf: &mut [u8]) -> CodecResult<usize>;

    /// Decodes the element from the start of `buf`.
    fn decode(iei: u8, buf: &[u8]) -> CodecResult<Self>;
}

/// Number of bytes the IEI takes for a given `iei` argument.
pub(crate) fn iei_len(iei: u8) -> usize {
    usize::from(iei != 0)
}

/// Writes the IEI, if any, after checking `buf` can hold `len` bytes.
///
/// Returns the offset of the value part.
pub(crate) fn encode_iei(iei: u8, len: usize, buf: &mut [u8]) -> CodecResult<usize> {
    let required = len - 1 + iei_len(iei);
    if buf.len() < required {
        return Err(CodecError::BufferTooSmall {
            required,
            available: buf.len(),
        });
    }
    if iei != 0 {
        buf[0] = iei;
    }
    Ok(iei_len(iei))
}

/// Checks the length and the IEI, if any, of an encoded element.
///
/// Returns the value part.
pub(crate) fn decode_iei(iei: u8, min_len: usize, buf: &[u8]) -> CodecResult<&[u8]> {
    let expected_min = min_len - 1 + iei_len(iei);
    if buf.len() < expected_min {
        return Err(CodecError::MalformedInput {
            expected_min,
            actual: buf.len(),
        });
    }
    if iei != 0 && buf[0] != iei {
        return Err(CodecError::IeiMismatch {
            expected: iei,
            found: buf[0],
        });
    }
    Ok(&buf[iei_len(iei)..])
}
