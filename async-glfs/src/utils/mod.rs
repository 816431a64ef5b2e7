pub mod better_as;
pub mod c_bytes;

use std::fmt::{self, Display};
use std::ascii;

/// Escapes non-printable bytes of a name for log output
#[derive(Debug)]
pub struct DisplayBytes<'a>(pub &'a [u8]);

impl Display for DisplayBytes<'_> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"")?;
        for &b in self.0 {
            for c in ascii::escape_default(b) {
                write!(f, "{}", char::from(c))?;
            }
        }
        write!(f, "\"")
    }
}
