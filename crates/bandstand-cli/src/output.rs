use anyhow::Result;
use bandstand_core::PublicError;
use serde::Serialize;

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a caller-safe error on stderr.
pub fn print_error(error: &PublicError) {
    match serde_json::to_string_pretty(error) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("Error: {}", error.message),
    }
}
