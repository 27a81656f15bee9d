//! Shape mask caching
//!
//! Rasterized coverage masks are position-independent: two shapes that
//! differ only in translation produce identical masks. The cache keys
//! entries on shape, stroke, antialiasing and the linear part of the
//! transform, and keeps them in a vector sorted by mask bounds so lookups
//! bracket a narrow size range before comparing geometry.
//!
//! Reference counts are explicit. The cache holding an `Rc` does not keep
//! an entry alive; only shape reps do, and a rep that dies off the render
//! thread hands its release to the disposer queue instead of touching GPU
//! state directly.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use glint_core::{Affine2D, BasicStroke, RectBounds, Rectangle, Shape};
use tracing::{debug, trace};

use crate::device::{Device, PixelFormat, TextureId};
use crate::rasterizer::{rasterize_fill, rasterize_stroke, MaskData};

/// Number of uncached renders before a rep tries to cache its mask
pub const CACHE_THRESHOLD: u32 = 2;
/// Masks wider or taller than this are never cached
pub const MAX_MASK_DIM: u32 = 512;

/// GPU texture holding a cached mask
#[derive(Clone, Copy, Debug)]
pub struct MaskTex {
    pub tex: TextureId,
    pub width: u32,
    pub height: u32,
}

/// One cached mask entry
#[derive(Debug)]
pub struct CacheEntry {
    pub id: u64,
    pub shape: Shape,
    pub stroke: Option<BasicStroke>,
    /// Transform at rasterization time; reuse requires equality of the
    /// linear part only
    pub xform: Affine2D,
    /// Transformed shape bounds at rasterization time (the sort key)
    pub xform_bounds: RectBounds,
    /// Device-space mask origin at rasterization time
    pub origin_x: f32,
    pub origin_y: f32,
    pub tex: MaskTex,
    pub antialiased: bool,
    pub ref_count: u32,
}

impl CacheEntry {
    fn matches(
        &self,
        shape: &Shape,
        stroke: Option<&BasicStroke>,
        xform: &Affine2D,
        antialiased: bool,
    ) -> bool {
        self.antialiased == antialiased
            && self.xform.equals_ignore_translation(xform)
            && self.stroke.as_ref() == stroke
            && &self.shape == shape
    }

    fn num_pixels(&self) -> u64 {
        self.tex.width as u64 * self.tex.height as u64
    }
}

/// Deferred release of a cache entry, drained on the render thread
#[derive(Clone, Copy, Debug)]
pub struct DisposerRecord {
    pub entry_id: u64,
    pub mask_width: u32,
    pub mask_height: u32,
}

/// Smallest float strictly greater than `x` (finite positive input)
fn next_up(x: f32) -> f32 {
    if x.is_nan() || x == f32::INFINITY {
        return x;
    }
    let bits = x.to_bits();
    if x == 0.0 {
        f32::from_bits(1)
    } else if bits >> 31 == 0 {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    }
}

fn key_less(a: (f32, f32), b: (f32, f32)) -> bool {
    a.0 < b.0 || (a.0 == b.0 && a.1 < b.1)
}

/// The shared mask cache, owned by the shader context
pub struct MaskCache {
    /// Sorted by (bounds width, bounds height)
    entries: Vec<Rc<RefCell<CacheEntry>>>,
    total_pixels: u64,
    pixel_budget: u64,
    next_id: u64,
}

impl MaskCache {
    pub fn new(pixel_budget: u64) -> Self {
        Self {
            entries: Vec::new(),
            total_pixels: 0,
            pixel_budget,
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_pixels(&self) -> u64 {
        self.total_pixels
    }

    fn entry_key(e: &Rc<RefCell<CacheEntry>>) -> (f32, f32) {
        let e = e.borrow();
        (e.xform_bounds.width(), e.xform_bounds.height())
    }

    /// Index range of entries whose bounds match `(w, h)` exactly
    fn range(&self, w: f32, h: f32) -> (usize, usize) {
        let lo = self
            .entries
            .partition_point(|e| key_less(Self::entry_key(e), (w, h)));
        // bracket the upper end with the next representable height
        let hi = self
            .entries
            .partition_point(|e| key_less(Self::entry_key(e), (w, next_up(h))));
        (lo, hi)
    }

    /// Find a live entry equivalent to the query and take a reference on it
    pub fn lookup(
        &mut self,
        shape: &Shape,
        stroke: Option<&BasicStroke>,
        xform: &Affine2D,
        bounds: &RectBounds,
        antialiased: bool,
    ) -> Option<Rc<RefCell<CacheEntry>>> {
        let (lo, hi) = self.range(bounds.width(), bounds.height());
        for e in &self.entries[lo..hi] {
            if e.borrow().matches(shape, stroke, xform, antialiased) {
                e.borrow_mut().ref_count += 1;
                trace!(id = e.borrow().id, "mask cache hit");
                return Some(Rc::clone(e));
            }
        }
        None
    }

    /// Whether a mask of the given dimensions may be admitted
    pub fn admits(&self, width: u32, height: u32) -> bool {
        width <= MAX_MASK_DIM
            && height <= MAX_MASK_DIM
            && self.total_pixels + width as u64 * height as u64 <= self.pixel_budget
    }

    /// Insert a freshly rasterized mask with an initial reference count of 1.
    ///
    /// Returns `None` without taking ownership when the entry does not fit
    /// the pixel budget; the caller renders uncached.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        shape: Shape,
        stroke: Option<BasicStroke>,
        xform: Affine2D,
        xform_bounds: RectBounds,
        mask: &MaskData,
        tex: TextureId,
        antialiased: bool,
    ) -> Option<Rc<RefCell<CacheEntry>>> {
        if !self.admits(mask.width, mask.height) {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        let entry = Rc::new(RefCell::new(CacheEntry {
            id,
            shape,
            stroke,
            xform,
            xform_bounds,
            origin_x: mask.origin_x as f32,
            origin_y: mask.origin_y as f32,
            tex: MaskTex {
                tex,
                width: mask.width,
                height: mask.height,
            },
            antialiased,
            ref_count: 1,
        }));
        let key = (xform_bounds.width(), xform_bounds.height());
        let at = self
            .entries
            .partition_point(|e| key_less(Self::entry_key(e), key));
        self.entries.insert(at, Rc::clone(&entry));
        self.total_pixels += mask.num_pixels();
        debug!(
            id,
            w = mask.width,
            h = mask.height,
            total = self.total_pixels,
            "cached shape mask"
        );
        Some(entry)
    }

    /// Drop one reference from an entry held directly.
    ///
    /// Returns the texture to dispose when the last reference went away.
    pub fn unref(&mut self, entry: &Rc<RefCell<CacheEntry>>) -> Option<TextureId> {
        let (id, w, h) = {
            let e = entry.borrow();
            (
                e.id,
                e.xform_bounds.width(),
                e.xform_bounds.height(),
            )
        };
        self.unref_located(id, w, h)
    }

    /// Drop one reference from a disposer record (entry located by mask
    /// bounds, then id)
    pub fn unref_by_record(&mut self, record: &DisposerRecord) -> Option<TextureId> {
        // records carry texel dims; entries in range may have fractional
        // bounds, so scan the whole cache when the bracketed scan misses
        let (lo, hi) = self.range(record.mask_width as f32, record.mask_height as f32);
        let found = self.entries[lo..hi]
            .iter()
            .position(|e| e.borrow().id == record.entry_id)
            .map(|i| i + lo)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|e| e.borrow().id == record.entry_id)
            });
        let idx = found?;
        self.unref_at(idx)
    }

    fn unref_located(&mut self, id: u64, w: f32, h: f32) -> Option<TextureId> {
        let (lo, hi) = self.range(w, h);
        let idx = self.entries[lo..hi]
            .iter()
            .position(|e| e.borrow().id == id)
            .map(|i| i + lo)?;
        self.unref_at(idx)
    }

    fn unref_at(&mut self, idx: usize) -> Option<TextureId> {
        let remove = {
            let mut e = self.entries[idx].borrow_mut();
            e.ref_count = e.ref_count.saturating_sub(1);
            e.ref_count == 0
        };
        if remove {
            let entry = self.entries.remove(idx);
            let e = entry.borrow();
            self.total_pixels -= e.num_pixels();
            debug!(id = e.id, total = self.total_pixels, "evicted shape mask");
            Some(e.tex.tex)
        } else {
            None
        }
    }

    /// Drop every entry regardless of reference count, returning the
    /// textures to dispose. Used on context disposal.
    pub fn clear(&mut self) -> Vec<TextureId> {
        self.total_pixels = 0;
        self.entries
            .drain(..)
            .map(|e| e.borrow().tex.tex)
            .collect()
    }
}

/// Cross-thread invalidation flag for a [`CachingShapeRep`]
///
/// Scene threads flip the flag when the shape's geometry or stroke changes;
/// the rep observes it at the next render and discards its cached mask.
#[derive(Clone, Debug)]
pub struct InvalidationHandle(Arc<AtomicBool>);

impl InvalidationHandle {
    pub fn invalidate(&self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CachePolicy {
    /// Still counting renders, or waiting for budget headroom
    Untried,
    /// Mask dimensions rule caching out for this rep
    NoCache,
}

/// What a shape rep hands back to the graphics layer for one render
pub enum MaskResult {
    /// A cached mask texture, with device-space placement
    Cached {
        tex: TextureId,
        x: f32,
        y: f32,
        width: u32,
        height: u32,
    },
    /// A freshly rasterized mask for one-shot upload through the scratch
    /// texture
    Uncached(MaskData),
    /// The shape covers no pixels
    Empty,
}

/// Per-node shape state tracking mask-cache participation
///
/// Render-thread-bound (it holds `Rc` entries). The only pieces that cross
/// threads are the [`InvalidationHandle`] and the disposer sender used by
/// `Drop`.
pub struct CachingShapeRep {
    render_count: u32,
    policy: CachePolicy,
    /// Transform of the previous render; the render counter only
    /// accumulates while the linear part stays stable
    last_xform: Option<Affine2D>,
    entry: Option<Rc<RefCell<CacheEntry>>>,
    invalid: Arc<AtomicBool>,
    disposer: Sender<DisposerRecord>,
}

impl CachingShapeRep {
    pub fn new(disposer: Sender<DisposerRecord>) -> Self {
        Self {
            render_count: 0,
            policy: CachePolicy::Untried,
            last_xform: None,
            entry: None,
            invalid: Arc::new(AtomicBool::new(false)),
            disposer,
        }
    }

    pub fn invalidation_handle(&self) -> InvalidationHandle {
        InvalidationHandle(Arc::clone(&self.invalid))
    }

    pub fn has_cached_entry(&self) -> bool {
        self.entry.is_some()
    }

    fn release_entry<D: Device>(&mut self, cache: &mut MaskCache, device: &mut D) {
        if let Some(entry) = self.entry.take() {
            if let Some(tex) = cache.unref(&entry) {
                device.dispose_texture(tex);
            }
        }
    }

    /// Produce a coverage mask for one render of the shape.
    ///
    /// Drives the caching state machine: renders uncached until the shape
    /// has been seen [`CACHE_THRESHOLD`] times, then rasterizes once into
    /// a cached texture that later renders (and other reps with equivalent
    /// geometry) reuse under translation.
    #[allow(clippy::too_many_arguments)]
    pub fn mask_for<D: Device>(
        &mut self,
        cache: &mut MaskCache,
        device: &mut D,
        shape: &Shape,
        stroke: Option<&BasicStroke>,
        xform: &Affine2D,
        clip: Option<Rectangle>,
        antialiased: bool,
    ) -> MaskResult {
        if self.invalid.swap(false, Ordering::Acquire) {
            self.release_entry(cache, device);
            self.render_count = 0;
            self.policy = CachePolicy::Untried;
            self.last_xform = None;
        }

        // reuse our own entry when it still describes this render
        if let Some(entry) = &self.entry {
            let usable = {
                let e = entry.borrow();
                e.matches(shape, stroke, xform, antialiased)
                    && !device.texture_surface_lost(e.tex.tex)
            };
            if usable {
                let e = entry.borrow();
                let (dx, dy) = xform.translation_delta(&e.xform);
                return MaskResult::Cached {
                    tex: e.tex.tex,
                    x: e.origin_x + dx,
                    y: e.origin_y + dy,
                    width: e.tex.width,
                    height: e.tex.height,
                };
            }
            self.release_entry(cache, device);
            self.render_count = 0;
            self.policy = CachePolicy::Untried;
        }

        // a transform change beyond translation restarts the count; the
        // cached mask would be for a different device-space footprint
        let stable = self
            .last_xform
            .as_ref()
            .is_some_and(|last| last.equals_ignore_translation(xform));
        if !stable {
            self.render_count = 0;
            self.policy = CachePolicy::Untried;
        }
        self.last_xform = Some(*xform);

        let bounds = compute_mask_bounds(shape, stroke, xform);
        if bounds.is_empty() {
            return MaskResult::Empty;
        }

        if self.policy == CachePolicy::Untried {
            // someone else may have cached equivalent geometry already
            if let Some(entry) = cache.lookup(shape, stroke, xform, &bounds, antialiased) {
                let result = {
                    let e = entry.borrow();
                    let (dx, dy) = xform.translation_delta(&e.xform);
                    MaskResult::Cached {
                        tex: e.tex.tex,
                        x: e.origin_x + dx,
                        y: e.origin_y + dy,
                        width: e.tex.width,
                        height: e.tex.height,
                    }
                };
                self.entry = Some(entry);
                return result;
            }

            self.render_count += 1;
            let mask_w = bounds.width().ceil() as u32 + 1;
            let mask_h = bounds.height().ceil() as u32 + 1;
            if mask_w > MAX_MASK_DIM || mask_h > MAX_MASK_DIM {
                self.policy = CachePolicy::NoCache;
            } else if self.render_count >= CACHE_THRESHOLD && cache.admits(mask_w, mask_h) {
                // rasterize unclipped so the mask stays valid under any
                // translation
                if let Some(mask) = rasterize(shape, stroke, xform, None, antialiased) {
                    if let Some(tex) = upload_mask(device, &mask) {
                        if let Some(entry) = cache.insert(
                            shape.clone(),
                            stroke.cloned(),
                            *xform,
                            bounds,
                            &mask,
                            tex,
                            antialiased,
                        ) {
                            let result = {
                                let e = entry.borrow();
                                MaskResult::Cached {
                                    tex: e.tex.tex,
                                    x: e.origin_x,
                                    y: e.origin_y,
                                    width: e.tex.width,
                                    height: e.tex.height,
                                }
                            };
                            self.entry = Some(entry);
                            return result;
                        }
                        // budget race; render uncached this frame
                        device.dispose_texture(tex);
                    }
                }
            }
        }

        match rasterize(shape, stroke, xform, clip, antialiased) {
            Some(mask) => MaskResult::Uncached(mask),
            None => MaskResult::Empty,
        }
    }

    /// Release the cached entry on the render thread (explicit teardown)
    pub fn dispose<D: Device>(&mut self, cache: &mut MaskCache, device: &mut D) {
        self.release_entry(cache, device);
        self.render_count = 0;
        self.policy = CachePolicy::Untried;
        self.last_xform = None;
    }
}

impl Drop for CachingShapeRep {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            let e = entry.borrow();
            // GPU teardown must happen on the render thread; hand the
            // release to the disposer queue
            let _ = self.disposer.send(DisposerRecord {
                entry_id: e.id,
                mask_width: e.tex.width,
                mask_height: e.tex.height,
            });
        }
    }
}

fn compute_mask_bounds(
    shape: &Shape,
    stroke: Option<&BasicStroke>,
    xform: &Affine2D,
) -> RectBounds {
    let mut b = shape.bounds();
    if let Some(s) = stroke {
        let pad = s.width * s.expansion_factor() + if s.join == glint_core::LineJoin::Miter {
            s.width * s.miter_limit * 0.5
        } else {
            0.0
        };
        b = b.grown(pad.max(s.width * 0.5));
    }
    xform.transform_bounds(&b)
}

fn rasterize(
    shape: &Shape,
    stroke: Option<&BasicStroke>,
    xform: &Affine2D,
    clip: Option<Rectangle>,
    antialiased: bool,
) -> Option<MaskData> {
    match stroke {
        Some(s) => rasterize_stroke(shape, s, xform, clip, antialiased),
        None => rasterize_fill(shape, xform, clip, antialiased),
    }
}

fn upload_mask<D: Device>(device: &mut D, mask: &MaskData) -> Option<TextureId> {
    let tex = device
        .create_texture(PixelFormat::Alpha8, mask.width, mask.height)
        .ok()?;
    let region = Rectangle::new(0, 0, mask.width as i32, mask.height as i32);
    if device.upload_texture(tex, region, &mask.alpha).is_err() {
        device.dispose_texture(tex);
        return None;
    }
    device.lock_texture(tex);
    Some(tex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_up_increases() {
        assert!(next_up(0.0) > 0.0);
        assert!(next_up(1.0) > 1.0);
        assert_eq!(next_up(f32::INFINITY), f32::INFINITY);
    }

    #[test]
    fn test_key_ordering() {
        assert!(key_less((1.0, 5.0), (2.0, 0.0)));
        assert!(key_less((1.0, 5.0), (1.0, 6.0)));
        assert!(!key_less((1.0, 5.0), (1.0, 5.0)));
    }

    #[test]
    fn test_budget_admission() {
        let cache = MaskCache::new(1000);
        assert!(cache.admits(20, 20));
        assert!(!cache.admits(40, 40));
        assert!(!cache.admits(MAX_MASK_DIM + 1, 1));
    }

    #[test]
    fn test_shared_mask_is_placed_by_translation_delta() {
        let mut device = crate::trace::TraceDevice::new();
        let mut cache = MaskCache::new(4_000_000);
        let (tx, _rx) = std::sync::mpsc::channel();
        let mut rep1 = CachingShapeRep::new(tx.clone());
        let mut rep2 = CachingShapeRep::new(tx);
        let shape = Shape::rect(0.0, 0.0, 20.0, 10.0);
        let t1 = Affine2D::translation(10.0, 5.0);
        let t2 = Affine2D::translation(33.0, 21.0);

        rep1.mask_for(&mut cache, &mut device, &shape, None, &t1, None, true);
        let MaskResult::Cached { x: x1, y: y1, .. } =
            rep1.mask_for(&mut cache, &mut device, &shape, None, &t1, None, true)
        else {
            panic!("second render should cache");
        };
        let MaskResult::Cached { x: x2, y: y2, .. } =
            rep2.mask_for(&mut cache, &mut device, &shape, None, &t2, None, true)
        else {
            panic!("equivalent rep should share the cached mask");
        };
        assert_eq!(x2 - x1, 23.0);
        assert_eq!(y2 - y1, 16.0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entries[0].borrow().ref_count, 2);
    }

    #[test]
    fn test_unstable_transform_never_reaches_the_threshold() {
        let mut device = crate::trace::TraceDevice::new();
        let mut cache = MaskCache::new(4_000_000);
        let (tx, _rx) = std::sync::mpsc::channel();
        let mut rep = CachingShapeRep::new(tx);
        let shape = Shape::rect(0.0, 0.0, 20.0, 10.0);

        for i in 0..6 {
            let xform = Affine2D::rotation(0.1 * (i + 1) as f32);
            let result = rep.mask_for(&mut cache, &mut device, &shape, None, &xform, None, true);
            assert!(matches!(result, MaskResult::Uncached(_)));
        }
        assert!(cache.is_empty());
        assert!(!rep.has_cached_entry());
    }
}
