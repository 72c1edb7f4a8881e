//! Controller ingest: validate access codes and relay updates to the bus.

pub mod connection;
pub mod envelope;
pub mod validate;
pub mod writer;

pub use connection::{process_envelope, serve_connection, Disposition};
pub use envelope::{Reply, UpdateEnvelope};
pub use validate::{check, Verdict};
pub use writer::{ConnectionWriter, WriteError};
