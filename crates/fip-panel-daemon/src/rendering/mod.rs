//! Rendering module for gauge canvases.

mod canvas;

pub use canvas::Canvas;
