//! Conversion of MongoDB driver errors into [`DriverError`]s.

use mongodb::error::{Error, ErrorKind, WriteFailure};

use docshim_core::driver::DriverError;

/// Converts a driver error, keeping the server code and message when the failure came
/// from the server.
///
/// Command errors, write errors and write concern errors carry a server code; every
/// other kind (network, pool, selection, ...) has none.
pub fn driver_error(error: Error) -> DriverError {
    let (code, message) = match error.kind.as_ref() {
        ErrorKind::Command(e) => (Some(e.code), e.message.clone()),
        ErrorKind::Write(WriteFailure::WriteError(e)) => (Some(e.code), e.message.clone()),
        ErrorKind::Write(WriteFailure::WriteConcernError(e)) => (Some(e.code), e.message.clone()),
        _ => (None, error.to_string()),
    };

    DriverError::new(code, message)
}
