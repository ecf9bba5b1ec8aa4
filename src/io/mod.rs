//! I/O plugins - file formats behind the session traits
//!
//! - `plugin` - `IoPlugin` trait and the `IoSystem` registry
//! - `options` - read/write session options
//! - `image_seq` - numbered still-image sequences via the `image` crate

pub mod image_seq;
pub mod options;
pub mod plugin;

pub use image_seq::{ImageSequenceOptions, ImageSequencePlugin};
pub use options::{IoOptions, ReadOptions, WriteOptions};
pub use plugin::{IoPlugin, IoSystem};
