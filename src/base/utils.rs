use std::fmt;

/// Helper struct that wraps bytes and improves their [`std::fmt::Debug`] formatting.
/// Tries to print as many bytes as possible just like regular characters; others are escaped.
pub struct PrettyBytes<'a>(pub &'a [u8]);

impl fmt::Debug for PrettyBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for &b in self.0 {
            match b {
                // human readable symbols, alphabet, etc
                b' '..=b'~' if b != b'"' && b != b'\\' => write!(f, "{}", b as char)?,
                // quotes, null bytes and other control bytes
                _ => write!(f, "\\x{:02x}", b)?,
            }
        }
        write!(f, "\"")
    }
}

impl fmt::Display for PrettyBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
