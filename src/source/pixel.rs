//! Immutable RGBA pixel blocks.
//!
//! A [`PixelBlock`] is the unit of pixel data exchanged between a tiled image
//! source and the viewport engine. Blocks are backed by [`Bytes`], so cloning
//! a block (or a whole zoom stack of them) is a reference-count bump, never a
//! pixel copy. This is what lets the zoom stack cache hand out snapshots
//! without blocking the builder.

use bytes::Bytes;

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// An immutable block of RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBlock {
    width: u32,
    height: u32,
    data: Bytes,
}

impl PixelBlock {
    /// Create a block from raw RGBA8 data.
    ///
    /// Returns `None` if `data` is not exactly `width * height * 4` bytes.
    pub fn from_raw(width: u32, height: u32, data: Bytes) -> Option<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Create a block filled with a single RGBA color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut buf = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for _ in 0..(width as usize * height as usize) {
            buf.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data: Bytes::from(buf),
        }
    }

    /// Block width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Block height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 data, row-major, no padding.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Size of the pixel payload in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Read the pixel at `(x, y)`. Returns `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = &self.data[idx..idx + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// A mutable RGBA8 canvas for composing sub-block fetches.
///
/// The builder partitions each level read into a grid of sub-blocks serviced
/// by independent workers; each worker's result lands in a disjoint
/// destination region of one canvas, which is then frozen into a
/// [`PixelBlock`].
#[derive(Debug)]
pub struct BlockCanvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BlockCanvas {
    /// Create a zeroed (transparent black) canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    /// Canvas width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Canvas height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Copy `block` into the canvas with its top-left corner at `(x, y)`.
    ///
    /// The block must fit entirely within the canvas; returns `false` (and
    /// writes nothing) otherwise.
    pub fn blit(&mut self, block: &PixelBlock, x: u32, y: u32) -> bool {
        let (bw, bh) = (block.width(), block.height());
        if x as u64 + bw as u64 > self.width as u64 || y as u64 + bh as u64 > self.height as u64 {
            return false;
        }

        let src = block.data();
        let row_bytes = bw as usize * BYTES_PER_PIXEL;
        let stride = self.width as usize * BYTES_PER_PIXEL;
        for row in 0..bh as usize {
            let src_off = row * row_bytes;
            let dst_off = (y as usize + row) * stride + x as usize * BYTES_PER_PIXEL;
            self.data[dst_off..dst_off + row_bytes].copy_from_slice(&src[src_off..src_off + row_bytes]);
        }
        true
    }

    /// Freeze the canvas into an immutable block.
    pub fn freeze(self) -> PixelBlock {
        PixelBlock {
            width: self.width,
            height: self.height,
            data: Bytes::from(self.data),
        }
    }
}
