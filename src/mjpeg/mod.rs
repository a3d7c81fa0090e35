//! MJPEG multipart demultiplexing.
//!
//! Cameras ship video as a `multipart/x-mixed-replace` sequence of JPEG
//! images separated by a boundary token. [`MjpegDemux`] accumulates raw
//! bytes and yields complete JPEG payloads; [`boundary_from_content_type`]
//! recovers the boundary token from the response header.

mod boundary;
mod demux;

pub use boundary::{DEFAULT_BOUNDARY, boundary_from_content_type, is_multipart};
pub use demux::{MAX_BUFFER_BYTES, MjpegDemux};
