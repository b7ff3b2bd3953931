#![forbid(unsafe_code)]

pub mod api;
pub mod errors;
pub mod wire;

pub use api::{features, features_for, ApiKey, ApiSupport, ApiVersionTable, VersionRange};
pub use errors::ErrorKind;
pub use wire::{Reservation, WireReader, WireWriter};

/// Size of the fixed part of a request header: ApiKey + ApiVersion +
/// CorrelationId. The ClientId string that follows is variable-length.
pub const REQUEST_HEADER_FIXED_LEN: usize = 2 + 2 + 4;

/// Read the correlation id that leads every response, returning it together
/// with a reader positioned at the start of the response body.
pub fn read_response_header(buf: &[u8]) -> Result<(i32, WireReader<'_>), ErrorKind> {
    let mut reader = WireReader::new(buf);
    let correlation_id = reader.read_i32()?;
    Ok((correlation_id, reader))
}
