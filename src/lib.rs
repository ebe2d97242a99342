//! # Image Transformer
//!
//! An HTTP service that transforms a region of a PNG image. The client posts
//! the image and names an operation and a rectangle in the URL; the service
//! clips the rectangle to the image, applies the operation and returns the
//! result as PNG.
//!
//! ```text
//! POST /process/rotate-cw/0,0,100,100      body: PNG bytes
//! POST /process/threshold(30)/-5,-30,200,50
//! ```
//!
//! # Architecture: Admission, Then a Synchronous Pipeline
//!
//! ```text
//! accept ─▶ admission ─┬─▶ worker: read body ─▶ validate ─▶ clip ─▶ apply ─▶ encode
//!                      └─▶ 429 responder
//! ```
//!
//! The accept loop never waits for a slot. When every slot is busy the
//! connection is answered with 429 straight away, so the server degrades by
//! shedding load instead of queueing it. Everything after admission is a
//! plain synchronous function of the request bytes, which keeps it testable
//! without sockets.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`server`] | Listener lifecycle, accept loop, per-connection HTTP workers |
//! | [`admission`] | Fixed pool of processing slots with non-blocking acquire |
//! | [`request`] | Method, length, path, coordinate, operation and body checks |
//! | [`process`] | validate → clip → apply → encode for one request |
//! | [`imaging`] | Region clipping, geometric and color operations, PNG codec |
//! | [`config`] | `config.toml` loading, validation and merging over stock defaults |
//!
//! # Design Decisions
//!
//! ## 64-bit Clipping
//!
//! Coordinates may be anywhere in ±2^31 and widths may be negative (drawing
//! left or up from the anchor). Sums of two such values overflow 32 bits, so
//! the clipper normalizes and intersects in `i64` and only narrows to `u32`
//! once the result is known to lie inside the image.
//!
//! ## Rotations Clip in Rotated Space
//!
//! For `rotate-cw` and `rotate-ccw` the requested area refers to the rotated
//! image, so it is clipped against the swapped bounds. A 40×30 image rotated
//! and asked for `0,0,100,100` returns all 30×40 rotated pixels.
//!
//! ## Empty Is Not an Error
//!
//! An area that misses the image produces 204 with no body. The pipeline
//! stops before touching any pixels.

pub mod admission;
pub mod config;
pub mod imaging;
pub mod process;
pub mod request;
pub mod server;
