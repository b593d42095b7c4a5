//! voxlab - tiled slice rendering and label editing for 5D volumes
//!
//! The crate holds the engine of a volumetric viewer/annotator:
//!
//! - [`tiling`] and [`tile`]: a slice is cut into tiles whose pixels are
//!   computed by a background worker pool from a stack of
//!   [`source::ImageSource`]s and cached with per-tile versioning.
//! - [`scene`]: one orthogonal view, painting onto an abstract
//!   [`surface::Surface`].
//! - [`volume`] and [`history`]: masked sub-volume writes on the label
//!   volume and a bounded undo/redo log of them, persistable as a ZIP of
//!   NumPy arrays.
//! - [`editor`]: the control-thread façade keeping labels, history and
//!   views consistent.
//!
//! Windowing and input handling live outside this crate.

pub mod config;
pub mod constants;
pub mod editor;
pub mod geometry;
pub mod history;
pub mod interaction;
pub mod scene;
pub mod source;
pub mod surface;
pub mod tile;
pub mod tiling;
pub mod volume;

pub use config::ViewerConfig;
pub use editor::VolumeEditor;
pub use scene::ImageScene2D;
pub use tile::TileProvider;
pub use tiling::Tiling;
