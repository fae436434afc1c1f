//! # Ingestors Module
//!
//! Everything between the serial port and the reading store:
//! raw bytes are decoded to text, measurements are pulled out of the text,
//! checked against plausible ranges, and handed to the store by the
//! ingestion loop.

/// Byte-stream to text decoding with control-character stripping.
pub mod decoder;

/// Regex-based measurement extraction from free-form lines.
pub mod extractor;

/// Serial port discovery and the `LineSource` abstraction.
pub mod serial_link;

/// The ingestion loop: state machine, rolling windows and circuit breaker.
pub mod serial_ingest;

/// Range checks that warn but never reject.
pub mod validator;

pub use decoder::ByteStreamDecoder;
pub use extractor::MeasurementExtractor;
pub use serial_ingest::{IngestError, IngestExit, IngestSettings, IngestState, IngestionLoop, LineOutcome};
pub use serial_link::{default_port, list_ports, LineSource, PortInfo, SerialError, SerialPortLink, SerialSettings};
pub use validator::validate;
