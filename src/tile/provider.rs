//! Background recomputation of stale tiles.
//!
//! A `TileProvider` owns one buffer per tile of its tiling and a fixed pool
//! of worker threads. The display thread asks for snapshots with
//! [`TileProvider::get_tiles`], which never waits for workers: stale tiles
//! come back with their old pixels and a progress below 1.0, and are queued
//! for recomputation. Finished tiles are reported through
//! [`TileProvider::take_changes`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{
    Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use image::RgbaImage;
use thiserror::Error;
use web_time::Instant;

use super::buffer::TileBuffer;
use super::raster;
use crate::geometry::{Rect, RectF};
use crate::source::{StackedImageSources, StackedLayer};
use crate::tiling::Tiling;
use crate::volume::SliceCoord;

/// Errors raised while setting up a provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// A worker thread could not be started
    #[error("failed to spawn tile worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// The slice is not along x, y or z
    #[error("cannot slice along axis {0}")]
    InvalidAxis(usize),
}

/// What the display layer gets for one tile.
#[derive(Debug, Clone)]
pub struct TileSnapshot {
    pub id: usize,
    pub rect: RectF,
    pub pixels: Arc<RgbaImage>,
    /// 1.0 exactly when the pixels are up to date.
    pub progress: f32,
}

/// Buffers laid out on one tiling. Replaced wholesale on retiling.
struct TileSet {
    tiling: Arc<Tiling>,
    buffers: Vec<TileBuffer>,
}

impl TileSet {
    /// All buffers start out stale: nothing has been rendered yet.
    fn new(tiling: Arc<Tiling>, notifier: &Sender<RectF>) -> Self {
        let buffers: Vec<TileBuffer> = tiling
            .scene_rects()
            .iter()
            .map(|rect| TileBuffer::new(*rect, Some(notifier.clone())))
            .collect();
        for buffer in &buffers {
            buffer.mark_dirty();
        }
        Self { tiling, buffers }
    }

    fn generation(&self) -> u64 {
        self.tiling.generation()
    }
}

#[derive(Debug, Default)]
struct WorkQueue {
    order: VecDeque<usize>,
    pending: HashSet<usize>,
    in_flight: HashSet<usize>,
    /// Tiles whose last recompute hit a failing source, with the data
    /// version it targeted. Not retried until invalidated again.
    failed: HashMap<usize, u64>,
    shutdown: bool,
}

impl WorkQueue {
    /// Queue a tile unless it is already pending or being computed.
    fn schedule(&mut self, id: usize) -> bool {
        if self.in_flight.contains(&id) || !self.pending.insert(id) {
            return false;
        }
        self.order.push_back(id);
        true
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    fn reset(&mut self) {
        self.order.clear();
        self.pending.clear();
        self.in_flight.clear();
        self.failed.clear();
    }
}

struct Shared {
    tiles: RwLock<Arc<TileSet>>,
    sources: RwLock<StackedImageSources>,
    slice: RwLock<SliceCoord>,
    queue: Mutex<WorkQueue>,
    work_ready: Condvar,
    idle: Condvar,
    notifier: Sender<RectF>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, WorkQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tile_set(&self) -> Arc<TileSet> {
        Arc::clone(&read(&self.tiles))
    }

    fn current_generation(&self) -> u64 {
        read(&self.tiles).generation()
    }

    /// Block until a tile is queued. `None` once shutdown was requested.
    fn next_job(&self) -> Option<(usize, Arc<TileSet>)> {
        let mut queue = self.lock_queue();
        loop {
            if queue.shutdown {
                return None;
            }
            if let Some(id) = queue.order.pop_front() {
                queue.pending.remove(&id);
                queue.in_flight.insert(id);
                return Some((id, self.tile_set()));
            }
            queue = self
                .work_ready
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn process(&self, id: usize, tiles: &TileSet) {
        let generation = tiles.generation();
        let (Some(buffer), Some(data_rect)) = (tiles.buffers.get(id), tiles.tiling.data_rect_of(id))
        else {
            log::warn!("Tile {} not in tiling #{}", id, generation);
            let mut queue = self.lock_queue();
            queue.in_flight.remove(&id);
            if queue.is_idle() {
                self.idle.notify_all();
            }
            return;
        };

        let target = buffer.data_version();
        let slice = *read(&self.slice);
        let layers = read(&self.sources).visible_layers();

        let (composite, complete) = composite_tile(&layers, data_rect, &slice, |done, total| {
            buffer.set_progress(target, done as f32 / total as f32);
        });
        let scene2data = tiles.tiling.data2scene().inverted().unwrap_or_default();
        let pixels = Arc::new(raster::to_display(
            &composite,
            &data_rect,
            &buffer.rect(),
            &scene2data,
        ));

        if self.current_generation() != generation {
            log::trace!("Discarding tile {} of retired tiling #{}", id, generation);
            return;
        }
        if complete {
            buffer.lock_and_replace(pixels, target);
        } else {
            buffer.lock_and_preview(pixels, target);
        }

        let mut queue = self.lock_queue();
        if self.current_generation() != generation {
            return;
        }
        queue.in_flight.remove(&id);
        if !complete {
            queue.failed.insert(id, target);
        }
        // Dirtied again while we were busy: catch up.
        if !buffer.is_fresh() && (complete || buffer.data_version() > target) {
            queue.failed.remove(&id);
            if queue.schedule(id) {
                self.work_ready.notify_one();
            }
        }
        if queue.is_idle() {
            self.idle.notify_all();
        }
    }
}

/// Fetch every layer for `rect` and blend them back-to-front.
///
/// Returns the composite in data orientation and whether every source
/// delivered. Failing sources are skipped.
fn composite_tile(
    layers: &[StackedLayer],
    rect: Rect,
    slice: &SliceCoord,
    mut on_progress: impl FnMut(usize, usize),
) -> (RgbaImage, bool) {
    let mut out = raster::blank(rect.width.max(0) as u32, rect.height.max(0) as u32);
    let mut complete = true;
    let total = layers.len();

    for (i, layer) in layers.iter().enumerate() {
        let name = layer.source.name();
        let fetched = panic::catch_unwind(AssertUnwindSafe(|| layer.source.fetch(rect, slice)));
        match fetched {
            Ok(Ok(patch)) if patch.valid => {
                if patch.pixels.dimensions() == out.dimensions() {
                    raster::composite_over(&mut out, &patch.pixels, layer.opacity);
                } else {
                    log::warn!(
                        "Source '{}' returned {:?} pixels for {:?}",
                        name,
                        patch.pixels.dimensions(),
                        rect
                    );
                    complete = false;
                }
            }
            Ok(Ok(_)) => log::trace!("Source '{}' has nothing for {:?}", name, rect),
            Ok(Err(e)) => {
                log::warn!("Source '{}' failed for {:?}: {}", name, rect, e);
                complete = false;
            }
            Err(_) => {
                log::error!("Source '{}' panicked for {:?}", name, rect);
                complete = false;
            }
        }
        on_progress(i + 1, total);
    }
    (out, complete)
}

fn worker_loop(shared: Arc<Shared>) {
    while let Some((id, tiles)) = shared.next_job() {
        shared.process(id, &tiles);
    }
}

/// Tile cache with a background worker pool.
pub struct TileProvider {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    changes: Receiver<RectF>,
}

impl TileProvider {
    /// Spawn `worker_count` workers (at least one) rendering `tiling` from
    /// `sources` at `slice`. All tiles start stale.
    pub fn new(
        tiling: Tiling,
        sources: StackedImageSources,
        slice: SliceCoord,
        worker_count: usize,
    ) -> Result<Self, ProviderError> {
        if !slice.has_spatial_axis() {
            return Err(ProviderError::InvalidAxis(slice.axis));
        }
        let (notifier, changes) = mpsc::channel();
        let tiles = TileSet::new(Arc::new(tiling), &notifier);
        let shared = Arc::new(Shared {
            tiles: RwLock::new(Arc::new(tiles)),
            sources: RwLock::new(sources),
            slice: RwLock::new(slice),
            queue: Mutex::new(WorkQueue::default()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            notifier,
        });

        let mut provider = Self {
            shared,
            workers: Vec::new(),
            changes,
        };
        for i in 0..worker_count.max(1) {
            let shared = Arc::clone(&provider.shared);
            // On error, `provider` is dropped and joins the workers started so far.
            let handle = thread::Builder::new()
                .name(format!("tile-worker-{}", i))
                .spawn(move || worker_loop(shared))?;
            provider.workers.push(handle);
        }
        log::info!(
            "Tile provider started: {} tiles, {} workers",
            provider.tiling().len(),
            provider.workers.len()
        );
        Ok(provider)
    }

    pub fn tiling(&self) -> Arc<Tiling> {
        Arc::clone(&self.shared.tile_set().tiling)
    }

    pub fn generation(&self) -> u64 {
        self.shared.current_generation()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn slice(&self) -> SliceCoord {
        *read(&self.shared.slice)
    }

    /// Snapshot of every tile overlapping `rect`, without waiting.
    ///
    /// Stale tiles are queued for recomputation unless already queued, in
    /// flight, or failed at their current version.
    pub fn get_tiles(&self, rect: &RectF) -> Vec<TileSnapshot> {
        let tiles = self.shared.tile_set();
        let mut stale = Vec::new();
        let snapshots: Vec<TileSnapshot> = tiles
            .tiling
            .indices_intersecting(rect)
            .into_iter()
            .filter_map(|id| {
                let buffer = tiles.buffers.get(id)?;
                let snap = buffer.snapshot();
                if !snap.is_fresh() {
                    stale.push((id, snap.data_version));
                }
                Some(TileSnapshot {
                    id,
                    rect: buffer.rect(),
                    pixels: snap.pixels,
                    progress: snap.progress,
                })
            })
            .collect();

        if !stale.is_empty() {
            let mut queue = self.shared.lock_queue();
            if self.shared.current_generation() == tiles.generation() {
                let mut scheduled = 0;
                for (id, version) in stale {
                    if queue.failed.get(&id) == Some(&version) {
                        continue;
                    }
                    if queue.schedule(id) {
                        scheduled += 1;
                    }
                }
                if scheduled > 0 {
                    log::trace!("Queued {} stale tiles", scheduled);
                    self.shared.work_ready.notify_all();
                }
            }
        }
        snapshots
    }

    /// Mark every tile overlapping `rect` (display space) dirty and queue
    /// it. Returns the affected tile indices.
    pub fn notify_sources_changed(&self, rect: &RectF) -> Vec<usize> {
        let mut queue = self.shared.lock_queue();
        let tiles = self.shared.tile_set();
        let affected = tiles.tiling.indices_intersecting(rect);
        let mut scheduled = false;
        for &id in &affected {
            tiles.buffers[id].mark_dirty();
            queue.failed.remove(&id);
            scheduled |= queue.schedule(id);
        }
        drop(queue);
        if scheduled {
            self.shared.work_ready.notify_all();
        }
        log::trace!("Sources changed in {:?}: {} tiles dirty", rect, affected.len());
        affected
    }

    /// Invalidate every tile.
    pub fn notify_all_changed(&self) -> Vec<usize> {
        let bounds = self.tiling().bounding_rect();
        self.notify_sources_changed(&bounds)
    }

    /// Show another slice; all tiles become stale.
    pub fn set_slice(&self, slice: SliceCoord) {
        if !slice.has_spatial_axis() {
            log::warn!("Ignoring slice along axis {}", slice.axis);
            return;
        }
        {
            let mut current = write(&self.shared.slice);
            if *current == slice {
                return;
            }
            *current = slice;
        }
        log::debug!("Tile provider now at {:?}", slice);
        self.notify_all_changed();
    }

    /// Edit the source stack (visibility, opacity, layers); all tiles
    /// become stale.
    pub fn update_sources(&self, update: impl FnOnce(&mut StackedImageSources)) {
        update(&mut write(&self.shared.sources));
        self.notify_all_changed();
    }

    /// Replace the tiling. Queued work is dropped and results of tiles
    /// still in flight are discarded when they land.
    pub fn retile(&self, tiling: Tiling) {
        let mut queue = self.shared.lock_queue();
        queue.reset();
        let tiles = TileSet::new(Arc::new(tiling), &self.shared.notifier);
        log::info!(
            "Retiling: #{} -> #{} ({} tiles)",
            self.shared.current_generation(),
            tiles.generation(),
            tiles.buffers.len()
        );
        *write(&self.shared.tiles) = Arc::new(tiles);
        drop(queue);
        self.shared.idle.notify_all();
    }

    /// Number of tiles queued or being computed.
    pub fn pending_count(&self) -> usize {
        let queue = self.shared.lock_queue();
        queue.pending.len() + queue.in_flight.len()
    }

    /// Block until no tile is queued or in flight. Returns `false` on
    /// timeout. Not meant for the display thread.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.lock_queue();
        while !queue.is_idle() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .idle
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            queue = guard;
        }
        true
    }

    /// Drain the rectangles of tiles that changed since the last call.
    pub fn take_changes(&self) -> Vec<RectF> {
        self.changes.try_iter().collect()
    }

    /// Ask the workers to exit after their current tile.
    pub fn notify_threads_to_stop(&self) {
        self.shared.lock_queue().shutdown = true;
        self.shared.work_ready.notify_all();
    }
}

impl Drop for TileProvider {
    fn drop(&mut self) {
        log::debug!("Shutting down tile provider");
        self.notify_threads_to_stop();
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.join() {
                log::warn!("Tile worker panicked: {:?}", e);
            }
        }
    }
}
