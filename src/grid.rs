// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Anchor grid generation.
//!
//! Grid-relative heads emit one output row per cell of each stride level. Rows are ordered
//! finest stride first, and within a level row-major (y outer, x inner), so the grid
//! produced here lines up index for index with the output tensor.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

/// One anchor cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridPoint {
    /// Column index within the level.
    pub gx: u32,
    /// Row index within the level.
    pub gy: u32,
    /// Stride of the level, in network pixels.
    pub stride: u32,
}

impl GridPoint {
    /// Cell center in network pixels.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn center(&self) -> (f32, f32) {
        let stride = self.stride as f32;
        (
            (self.gx as f32 + 0.5) * stride,
            (self.gy as f32 + 0.5) * stride,
        )
    }
}

/// Number of anchors a `network_w x network_h` input produces over `strides`.
#[must_use]
pub fn grid_len(network_w: u32, network_h: u32, strides: &[u32]) -> usize {
    strides
        .iter()
        .filter(|&&s| s > 0)
        .map(|&s| (network_w / s) as usize * (network_h / s) as usize)
        .sum()
}

/// Enumerate the anchors of every stride level, finest first. Zero strides are skipped.
#[must_use]
pub fn generate_grid(network_w: u32, network_h: u32, strides: &[u32]) -> Vec<GridPoint> {
    let mut grid = Vec::with_capacity(grid_len(network_w, network_h, strides));
    for &stride in strides.iter().filter(|&&s| s > 0) {
        let (cols, rows) = (network_w / stride, network_h / stride);
        for gy in 0..rows {
            for gx in 0..cols {
                grid.push(GridPoint { gx, gy, stride });
            }
        }
    }
    grid
}

type GridKey = (u32, u32, Vec<u32>);

/// Memoized grids keyed by network size and strides.
///
/// A miss generates the grid while holding the lock, so each size is built once.
#[derive(Debug)]
pub struct GridCache {
    cache: Mutex<LruCache<GridKey, Arc<[GridPoint]>>>,
}

impl Default for GridCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl GridCache {
    /// Distinct network sizes kept by default.
    pub const DEFAULT_CAPACITY: usize = 8;

    /// Create a cache holding up to `capacity` grids (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the grid for this size, generating it on a miss.
    pub fn get_or_generate(
        &self,
        network_w: u32,
        network_h: u32,
        strides: &[u32],
    ) -> Arc<[GridPoint]> {
        let key = (network_w, network_h, strides.to_vec());
        let mut cache = self.lock();
        let grid = cache.get_or_insert(key, || {
            let grid: Arc<[GridPoint]> = generate_grid(network_w, network_h, strides).into();
            tracing::debug!(network_w, network_h, anchors = grid.len(), "generated anchor grid");
            grid
        });
        Arc::clone(grid)
    }

    /// Number of cached grids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Poisoning is ignored: entries are inserted whole.
    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<GridKey, Arc<[GridPoint]>>> {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
