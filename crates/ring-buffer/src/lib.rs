//! Byte Ring Buffer
//!
//! Provides the fixed-capacity byte buffer used once per bridge direction,
//! plus the terminator scanner that splits its contents into lines.

mod buffer;
mod error;
mod scanner;

pub use buffer::{OverflowPolicy, RingBuffer};
pub use error::{RingBufferError, TerminatorError};
pub use scanner::{Terminator, TerminatorScanner, MAX_TERMINATOR_LEN};
