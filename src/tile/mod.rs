//! Tile pixel storage, the brushing overlay and the background provider.

mod buffer;
mod layer;
mod provider;
pub mod raster;

pub use buffer::{BufferSnapshot, TileBuffer};
pub use layer::TiledImageLayer;
pub use provider::{ProviderError, TileProvider, TileSnapshot};
pub use raster::Pen;
