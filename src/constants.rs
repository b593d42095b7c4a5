//! Global constants for voxlab

/// Tile edge length in data pixels
pub const DEFAULT_TILE_EDGE: u32 = 256;

/// Tile workers per scene
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Undo steps kept by default
pub const DEFAULT_HISTORY_SIZE: usize = 3000;

/// Group the undo log is stored under
pub const DEFAULT_HISTORY_GROUP: &str = "_history";
