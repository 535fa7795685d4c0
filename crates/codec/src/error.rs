/// An error occurring during the codec process.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An error occurring at the decoding state.
    #[error(transparent)]
    Decoding(#[from] DecodingError),
}

impl CodecError {
    /// Returns the byte offset into the input at which decoding failed.
    pub const fn offset(&self) -> usize {
        match self {
            Self::Decoding(err) => err.offset(),
        }
    }
}

/// An error occurring during the decoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodingError {
    /// The input was empty, so no version tag could be read.
    #[error("missing codec version in input")]
    MissingCodecVersion,
    /// The leading version tag is outside the supported range.
    #[error("unsupported codec version {0}")]
    UnsupportedCodecVersion(u8),
    /// The input ended before the value was complete.
    #[error("input truncated at offset {offset}")]
    Truncated {
        /// Offset at which more bytes were expected.
        offset: usize,
    },
    /// The input is not a valid encoding of the expected value.
    #[error("decoding failed at offset {offset}: {reason}")]
    Malformed {
        /// Offset of the offending item.
        offset: usize,
        /// The underlying rlp error.
        reason: alloy_rlp::Error,
    },
    /// The value decoded but bytes remained after it.
    #[error("{remaining} trailing bytes at offset {offset}")]
    TrailingBytes {
        /// Offset of the first trailing byte.
        offset: usize,
        /// Number of bytes left over.
        remaining: usize,
    },
}

impl DecodingError {
    /// Returns the byte offset of the error.
    pub const fn offset(&self) -> usize {
        match self {
            Self::MissingCodecVersion | Self::UnsupportedCodecVersion(_) => 0,
            Self::Truncated { offset } |
            Self::Malformed { offset, .. } |
            Self::TrailingBytes { offset, .. } => *offset,
        }
    }

    /// Returns true if the error was caused by a truncated input.
    pub const fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }

    /// Returns true if the error was caused by a missing or unknown version tag.
    pub const fn is_unknown_version(&self) -> bool {
        matches!(self, Self::UnsupportedCodecVersion(_) | Self::MissingCodecVersion)
    }

    /// Builds a [`DecodingError`] from an rlp error observed at `offset`.
    pub(crate) const fn from_rlp(err: alloy_rlp::Error, offset: usize) -> Self {
        match err {
            alloy_rlp::Error::InputTooShort => Self::Truncated { offset },
            reason => Self::Malformed { offset, reason },
        }
    }
}
