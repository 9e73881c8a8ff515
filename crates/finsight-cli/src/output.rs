use std::io::{self, Write};

use serde::Serialize;

use crate::error::CliError;

/// Write one JSON document to stdout.
pub fn render<T: Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    write_json(&mut stdout, value, pretty)?;
    stdout.flush()?;
    Ok(())
}

/// Write one compact JSON line and flush, for streamed output.
pub fn render_line<T: Serialize>(value: &T) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    write_json(&mut stdout, value, false)?;
    stdout.flush()?;
    Ok(())
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T, pretty: bool) -> Result<(), CliError> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, value)?;
    } else {
        serde_json::to_writer(&mut *out, value)?;
    }
    writeln!(out)?;
    Ok(())
}
