//! Terminator Matching
//!
//! Splits the logical (unwrapped) byte stream of a ring buffer on a
//! 1-4 byte terminator sequence.

use crate::buffer::RingBuffer;
use crate::error::TerminatorError;
use std::fmt;
use std::str::FromStr;

/// Longest supported terminator in bytes
pub const MAX_TERMINATOR_LEN: usize = 4;

/// Immutable terminator sequence of 1 to 4 bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Terminator {
    bytes: [u8; MAX_TERMINATOR_LEN],
    len: u8,
}

impl Terminator {
    /// Create a terminator from raw bytes
    pub fn new(bytes: &[u8]) -> Result<Self, TerminatorError> {
        if bytes.is_empty() {
            return Err(TerminatorError::Empty);
        }
        if bytes.len() > MAX_TERMINATOR_LEN {
            return Err(TerminatorError::TooLong(bytes.len()));
        }

        let mut storage = [0u8; MAX_TERMINATOR_LEN];
        storage[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            bytes: storage,
            len: bytes.len() as u8,
        })
    }

    /// Carriage return + line feed
    pub fn crlf() -> Self {
        Self {
            bytes: [b'\r', b'\n', 0, 0],
            len: 2,
        }
    }

    /// Carriage return only
    pub fn cr() -> Self {
        Self {
            bytes: [b'\r', 0, 0, 0],
            len: 1,
        }
    }

    /// Terminator bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Terminator length in bytes
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false, a terminator has at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Render as dotted hex, e.g. `0D.0A`
    pub fn to_hex(&self) -> String {
        self.as_bytes()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl Default for Terminator {
    fn default() -> Self {
        Self::crlf()
    }
}

impl FromStr for Terminator {
    type Err = TerminatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.as_bytes())
    }
}

impl fmt::Debug for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Terminator({})", self.to_hex())
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Sliding-window search for a terminator over a possibly wrapped view
#[derive(Debug, Clone, Copy)]
pub struct TerminatorScanner {
    terminator: Terminator,
}

impl TerminatorScanner {
    /// Create a scanner for the given terminator
    pub fn new(terminator: Terminator) -> Self {
        Self { terminator }
    }

    /// Terminator this scanner looks for
    pub fn terminator(&self) -> Terminator {
        self.terminator
    }

    /// Scan the unread bytes of a ring buffer
    pub fn scan(&self, buffer: &RingBuffer) -> Option<usize> {
        let (first, second) = buffer.read_available();
        self.find(first, second)
    }

    /// Return the index one past the end of the earliest complete match in
    /// the logical sequence `first ++ second`.
    pub fn find(&self, first: &[u8], second: &[u8]) -> Option<usize> {
        let needle = self.terminator.as_bytes();
        let total = first.len() + second.len();
        if total < needle.len() {
            return None;
        }

        let byte_at = |i: usize| {
            if i < first.len() {
                first[i]
            } else {
                second[i - first.len()]
            }
        };

        (0..=total - needle.len())
            .find(|&start| {
                needle
                    .iter()
                    .enumerate()
                    .all(|(offset, &b)| byte_at(start + offset) == b)
            })
            .map(|start| start + needle.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_length_limits() {
        assert_eq!(Terminator::new(b""), Err(TerminatorError::Empty));
        assert_eq!(Terminator::new(b"12345"), Err(TerminatorError::TooLong(5)));
        assert_eq!(Terminator::new(b"\r\n\r\n").unwrap().len(), 4);
        // Multi-byte UTF-8 counts bytes, not characters
        assert!("€€".parse::<Terminator>().is_err());
        assert_eq!("€".parse::<Terminator>().unwrap().len(), 3);
    }

    #[test]
    fn test_hex_rendering() {
        assert_eq!(Terminator::crlf().to_hex(), "0D.0A");
        assert_eq!(format!("{:?}", Terminator::cr()), "Terminator(0D)");
    }

    #[test]
    fn test_find_first_match_only() {
        let scanner = TerminatorScanner::new(Terminator::crlf());
        assert_eq!(scanner.find(b"ab\r\ncd\r\n", b""), Some(4));
        assert_eq!(scanner.find(b"abcd", b""), None);
        assert_eq!(scanner.find(b"", b""), None);
    }

    #[test]
    fn test_find_straddling_split() {
        let scanner = TerminatorScanner::new(Terminator::crlf());
        assert_eq!(scanner.find(b"line\r", b"\nrest"), Some(6));
        assert_eq!(scanner.find(b"", b"x\r\n"), Some(3));

        let long = TerminatorScanner::new(Terminator::new(b"END!").unwrap());
        assert_eq!(long.find(b"dataE", b"ND!"), Some(8));
    }

    #[test]
    fn test_partial_terminator_is_not_a_match() {
        let scanner = TerminatorScanner::new(Terminator::crlf());
        assert_eq!(scanner.find(b"abc\r", b""), None);
        assert_eq!(scanner.find(b"\n\r", b""), None);
    }

    #[test]
    fn test_overlapping_prefix() {
        let scanner = TerminatorScanner::new(Terminator::new(b"aab").unwrap());
        assert_eq!(scanner.find(b"aaab", b""), Some(4));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn scan_is_idempotent(
            data in proptest::collection::vec(prop_oneof![Just(b'\r'), Just(b'\n'), any::<u8>()], 0..64),
            skip in 0usize..64,
        ) {
            let mut buffer = RingBuffer::new(64).unwrap();
            buffer.write(&vec![0u8; skip.min(63)]);
            buffer.consume(skip.min(63)).unwrap();
            buffer.write(&data);

            let scanner = TerminatorScanner::new(Terminator::crlf());
            let first = scanner.scan(&buffer);
            prop_assert_eq!(first, scanner.scan(&buffer));

            let flat: Vec<u8> = data[..buffer.len()].to_vec();
            let expected = flat.windows(2).position(|w| w == b"\r\n").map(|p| p + 2);
            prop_assert_eq!(first, expected);
        }
    }
}
