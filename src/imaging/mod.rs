//! Image processing in pure Rust, PNG only.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify / decode / encode** | `image` crate PNG codec behind [`ImageCodec`] |
//! | **Rotate** | `imageops::rotate90` / `rotate270` |
//! | **Flip** | `imageops::flip_horizontal_in_place` / `flip_vertical_in_place` |
//! | **Crop** | `imageops::crop_imm` |
//! | **Grayscale / sepia / threshold** | [`filters`], parallel over pixels with rayon |
//!
//! The module is split into:
//! - **Parameters**: [`Operation`], [`RequestedRect`], [`Rect`]
//! - **Calculations**: Pure region clipping (unit and property tested)
//! - **Backend**: [`ImageCodec`] trait + [`PngCodec`]
//! - **Operations**: Dispatch of an operation onto a clipped region

pub mod backend;
mod calculations;
pub mod filters;
pub mod operations;
mod params;
pub mod png_codec;

pub use backend::{CodecError, Dimensions, ImageCodec};
pub use calculations::{clip_to_size, intersect, output_bounds};
pub use operations::apply;
pub use params::{MAX_COORDINATE, Operation, Rect, RequestedRect};
pub use png_codec::PngCodec;
