use core::alloc::Layout;
use core::fmt;

/// Errors reported by the fallible table operations.
///
/// The infallible counterparts (`insert`, `reserve`, ...) never return these:
/// they panic on [`Error::CapacityOverflow`] and call
/// [`handle_alloc_error`](alloc::alloc::handle_alloc_error) on
/// [`Error::OutOfMemory`], the same way the standard collections do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// The requested number of buckets cannot be represented.
    CapacityOverflow,
    /// The allocator could not provide a buffer with this layout. The table is
    /// left exactly as it was before the call.
    OutOfMemory {
        /// Layout of the buffer that could not be allocated.
        layout: Layout,
    },
    /// A maximum load factor outside the open interval `(0.2, 0.9999)`.
    InvalidLoadFactor(f32),
    /// The key passed to an `at`-style accessor is not present.
    KeyNotFound,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityOverflow => f.write_str("capacity overflow"),
            Error::OutOfMemory { layout } => write!(
                f,
                "memory allocation of {} bytes (align {}) failed",
                layout.size(),
                layout.align()
            ),
            Error::InvalidLoadFactor(value) => {
                write!(f, "max load factor {value} is outside (0.2, 0.9999)")
            }
            Error::KeyNotFound => f.write_str("key not found"),
        }
    }
}

impl core::error::Error for Error {}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(Error::CapacityOverflow.to_string(), "capacity overflow");
        assert_eq!(Error::KeyNotFound.to_string(), "key not found");
        assert_eq!(
            Error::InvalidLoadFactor(1.5).to_string(),
            "max load factor 1.5 is outside (0.2, 0.9999)"
        );

        let layout = Layout::from_size_align(128, 8).unwrap();
        assert_eq!(
            Error::OutOfMemory { layout }.to_string(),
            "memory allocation of 128 bytes (align 8) failed"
        );
    }
}
