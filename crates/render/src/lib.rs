//! Folio Render Library
//!
//! Tiled bitmap rendering for the document viewer: power-of-two tile
//! addressing, a bounded bitmap cache with shared-ownership entries, an
//! idempotent request queue, a single background render worker, and
//! progressive paint planning that shows coarse placeholders while the
//! exact tiles render.

pub mod cache;
pub mod paint;
pub mod queue;
pub mod tile;
pub mod worker;

pub use cache::{CacheEntry, CacheStats, RenderKey, ViewId, ZoomMatch};
pub use paint::PaintOp;
pub use queue::{PushOutcome, QueueStats, RenderCallback};
pub use tile::{select_tile_resolution, TilePosition, MAX_TILE_RES};
pub use worker::{NoopRenderHost, RenderConfig, RenderDelay, RenderHost, TileRenderCache};
