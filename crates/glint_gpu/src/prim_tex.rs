//! Precomputed coverage textures for small primitives
//!
//! Small axis-aligned rects and ovals are drawn as a single textured quad
//! sampling a ramp texture instead of running an analytic shader. The ramp
//! texture packs one cell per whole-pixel size `n`, each preceded by a
//! zero texel so that bilinear filtering produces the antialiased fringe at
//! the cell edges.
//!
//! Cell `n` starts at texel `n * (n + 1) / 2`; the texel-space left edge of
//! the cell is half a texel before that, right on the boundary with the
//! zero gap texel.

use glint_core::Rectangle;

use crate::device::{Device, GpuError, PixelFormat, TextureId};

/// Texel offset of the cell for size `n`
pub fn cell_offset(n: u32) -> u32 {
    n * (n + 1) / 2
}

/// Largest cell size that fits a ramp texture of the given edge length
pub fn max_cell_size(tex_size: u32) -> u32 {
    let mut n = 0;
    while cell_offset(n + 1) + n + 2 <= tex_size {
        n += 1;
    }
    n
}

/// Normalized texcoord span covering a fractional extent `frac` inside
/// cell `n` of a ramp texture with edge `tex_size`
pub fn cell_span(n: u32, frac: f32, tex_size: u32) -> (f32, f32) {
    let u0 = cell_offset(n) as f32 - 0.5;
    let u1 = u0 + frac;
    (u0 / tex_size as f32, u1 / tex_size as f32)
}

fn alpha8_region(size: u32) -> Rectangle {
    Rectangle::new(0, 0, size as i32, size as i32)
}

/// Separable rect coverage ramp (outer product of the 1D ramp with itself)
pub struct RectPrimTexture {
    pub tex: TextureId,
    pub size: u32,
    pub max_cell: u32,
}

impl RectPrimTexture {
    pub fn create<D: Device>(device: &mut D, size: u32) -> Result<Self, GpuError> {
        let max_cell = max_cell_size(size);
        let ramp = build_ramp(size, max_cell);
        let mut data = vec![0u8; (size * size) as usize];
        for y in 0..size as usize {
            for x in 0..size as usize {
                data[y * size as usize + x] =
                    ((ramp[x] as u32 * ramp[y] as u32 + 127) / 255) as u8;
            }
        }
        let tex = device.create_texture(PixelFormat::Alpha8, size, size)?;
        device.upload_texture(tex, alpha8_region(size), &data)?;
        device.lock_texture(tex);
        Ok(Self {
            tex,
            size,
            max_cell,
        })
    }
}

/// Per-cell-pair analytic oval coverage; the region addressed by x-cell `n`
/// and y-cell `m` holds the coverage of an `n` by `m` ellipse
pub struct OvalPrimTexture {
    pub tex: TextureId,
    pub size: u32,
    pub max_cell: u32,
}

impl OvalPrimTexture {
    pub fn create<D: Device>(device: &mut D, size: u32) -> Result<Self, GpuError> {
        let max_cell = max_cell_size(size);
        let mut data = vec![0u8; (size * size) as usize];
        for n in 1..=max_cell {
            for m in 1..=max_cell {
                let ox = cell_offset(n);
                let oy = cell_offset(m);
                for j in 0..m {
                    for i in 0..n {
                        let a = ellipse_coverage(i, j, n, m);
                        data[((oy + j) * size + ox + i) as usize] = a;
                    }
                }
            }
        }
        let tex = device.create_texture(PixelFormat::Alpha8, size, size)?;
        device.upload_texture(tex, alpha8_region(size), &data)?;
        device.lock_texture(tex);
        Ok(Self {
            tex,
            size,
            max_cell,
        })
    }
}

/// A small clamp-to-zero interior texture for wrapped/tiled rect quads:
/// zero border, full-coverage interior
pub struct WrapRectTexture {
    pub tex: TextureId,
    pub size: u32,
}

pub const WRAP_TEX_SIZE: u32 = 32;

impl WrapRectTexture {
    pub fn create<D: Device>(device: &mut D) -> Result<Self, GpuError> {
        let size = WRAP_TEX_SIZE;
        let mut data = vec![255u8; (size * size) as usize];
        for i in 0..size as usize {
            data[i] = 0;
            data[(size as usize - 1) * size as usize + i] = 0;
            data[i * size as usize] = 0;
            data[i * size as usize + size as usize - 1] = 0;
        }
        let tex = device.create_texture(PixelFormat::Alpha8, size, size)?;
        device.upload_texture(tex, alpha8_region(size), &data)?;
        device.lock_texture(tex);
        Ok(Self { tex, size })
    }

    /// Normalized span covering the full texture edge to edge; the half
    /// texel of zero border on each end becomes the antialiased fringe
    pub fn span(&self) -> (f32, f32) {
        let s = self.size as f32;
        (0.5 / s, (s - 0.5) / s)
    }
}

fn build_ramp(size: u32, max_cell: u32) -> Vec<u8> {
    let mut ramp = vec![0u8; size as usize];
    for n in 1..=max_cell {
        let off = cell_offset(n);
        for i in 0..n {
            ramp[(off + i) as usize] = 255;
        }
    }
    ramp
}

/// Supersampled coverage of an `n` by `m` pixel ellipse at pixel `(i, j)`
fn ellipse_coverage(i: u32, j: u32, n: u32, m: u32) -> u8 {
    const SS: u32 = 4;
    let rx = n as f32 / 2.0;
    let ry = m as f32 / 2.0;
    let cx = rx;
    let cy = ry;
    let mut hits = 0u32;
    for sy in 0..SS {
        for sx in 0..SS {
            let x = i as f32 + (sx as f32 + 0.5) / SS as f32;
            let y = j as f32 + (sy as f32 + 0.5) / SS as f32;
            let dx = (x - cx) / rx;
            let dy = (y - cy) / ry;
            if dx * dx + dy * dy <= 1.0 {
                hits += 1;
            }
        }
    }
    ((hits * 255 + SS * SS / 2) / (SS * SS)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_offsets() {
        assert_eq!(cell_offset(1), 1);
        assert_eq!(cell_offset(2), 3);
        assert_eq!(cell_offset(3), 6);
        // one zero gap texel between consecutive cells
        assert_eq!(cell_offset(2), cell_offset(1) + 1 + 1);
    }

    #[test]
    fn test_max_cell_size_fits() {
        let size = 128;
        let n = max_cell_size(size);
        assert!(cell_offset(n) + n + 1 <= size);
        assert!(cell_offset(n + 1) + n + 2 > size);
    }

    #[test]
    fn test_ramp_has_zero_gaps() {
        let size = 64;
        let max = max_cell_size(size);
        let ramp = build_ramp(size, max);
        for n in 1..=max {
            let off = cell_offset(n) as usize;
            assert_eq!(ramp[off - 1], 0, "gap before cell {n}");
            for i in 0..n as usize {
                assert_eq!(ramp[off + i], 255, "interior of cell {n}");
            }
        }
    }

    #[test]
    fn test_cell_span_straddles_gap() {
        let (u0, u1) = cell_span(2, 2.0, 64);
        // left edge lands on the boundary between gap and first texel
        assert!((u0 * 64.0 - 2.5).abs() < 1e-5);
        assert!((u1 * 64.0 - 4.5).abs() < 1e-5);
    }

    #[test]
    fn test_ellipse_coverage_center_full() {
        assert_eq!(ellipse_coverage(2, 2, 5, 5), 255);
        assert!(ellipse_coverage(0, 0, 5, 5) < 128);
    }
}
