//! Utility module
//!
//! Helpers shared by the codec and transport for diagnostic output.

use std::fmt::Write;

/// Formats bytes as space-separated upper-case hex, e.g. `0F EE 00`
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", byte);
    }
    out
}
