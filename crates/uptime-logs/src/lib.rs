//! uptime-logs — durable probe history for the uptime worker.
//!
//! Every check owns one append-only text file under the log root
//! (`{id}.log`, one JSON object per line). Rotation compresses the current
//! contents into a distinctly named archive (`{archive}.gz.b64`, gzip then
//! base64 so archives stay text) and truncates the live file in place.
//!
//! # Concurrency
//!
//! All operations on the same log name are serialized through a per-name
//! async mutex. An append can never interleave with another append, nor
//! land between a rotation's compress and truncate steps.

pub mod codec;
pub mod error;
pub mod history;

pub use error::{LogError, LogResult};
pub use history::{HistoryLog, Rotation, ARCHIVE_EXT, LOG_EXT};
