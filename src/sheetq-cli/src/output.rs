//! Output formatting for the sheetq CLI

use std::io::{self, Write};

use serde::Serialize;

/// Serialize `value` as pretty or compact JSON
pub fn render_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> serde_json::Result<String> {
    if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
}

/// Write `value` as JSON followed by a newline
pub fn write_json<W: Write, T: Serialize + ?Sized>(
    writer: &mut W,
    value: &T,
    compact: bool,
) -> io::Result<()> {
    let text = render_json(value, compact).map_err(io::Error::other)?;
    writeln!(writer, "{text}")
}
