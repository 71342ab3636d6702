use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bitvec::prelude::*;

pub(crate) const SCREEN_WIDTH: u8 = 64;
pub(crate) const SCREEN_HEIGHT: u8 = 32;
// 1 bit per pixel, bit 7 of each byte is the leftmost pixel
pub(crate) const FB_LEN: usize = SCREEN_WIDTH as usize * SCREEN_HEIGHT as usize / 8;

const ROW_BYTES: usize = SCREEN_WIDTH as usize / 8;

/// A copy of the display bitmap taken under the lock.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub(crate) pixels: [u8; FB_LEN],
    /// Whether the buffer changed since the previous snapshot.
    pub(crate) dirty: bool,
}

impl Frame {
    #[must_use]
    pub(crate) fn pixel(&self, x: u8, y: u8) -> bool {
        let index = usize::from(y) * usize::from(SCREEN_WIDTH) + usize::from(x);
        self.pixels.view_bits::<Msb0>()[index]
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..SCREEN_HEIGHT {
            for x in 0..SCREEN_WIDTH {
                f.write_str(if self.pixel(x, y) { "█" } else { " " })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frame {{ dirty: {} }}", self.dirty)?;
        for row in self.pixels.chunks(ROW_BYTES) {
            for byte in row {
                write!(f, "{byte:08b}|")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Bitmap {
    data: [u8; FB_LEN],
    dirty: bool,
}

/// The 64x32 monochrome display, shared between the run loop (writer) and a
/// renderer (reader). Every access goes through one lock, so a reader never
/// sees a partially drawn sprite.
#[derive(Debug)]
pub(crate) struct FrameBuffer {
    bitmap: Mutex<Bitmap>,
}

impl FrameBuffer {
    pub(crate) fn new() -> Self {
        Self {
            bitmap: Mutex::new(Bitmap {
                data: [0; FB_LEN],
                dirty: false,
            }),
        }
    }

    // a panic while holding the lock cannot leave a half-written byte behind
    fn lock(&self) -> MutexGuard<'_, Bitmap> {
        self.bitmap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn clear(&self) {
        let mut bitmap = self.lock();
        bitmap.data = [0; FB_LEN];
        bitmap.dirty = true;
    }

    /// XOR an 8 pixel wide sprite onto the display at (`x`, `y`).
    ///
    /// The origin wraps around both edges. Rows falling past the bottom edge
    /// are clipped, as are pixels falling past the right edge. Returns true if
    /// any set pixel was cleared.
    pub(crate) fn draw(&self, sprite: &[u8], x: u8, y: u8) -> bool {
        let x = x % SCREEN_WIDTH;
        let y = y % SCREEN_HEIGHT;
        let offset = x % 8;

        let mut bitmap = self.lock();
        let mut collision = false;

        for (row, &bits) in sprite.iter().enumerate() {
            let line = usize::from(y) + row;
            if line >= usize::from(SCREEN_HEIGHT) {
                break;
            }

            let li = usize::from(x / 8) + ROW_BYTES * line;
            let ls = bits >> offset;
            collision |= bitmap.data[li] & ls != 0;
            bitmap.data[li] ^= ls;

            let ri = li + 1;
            if offset > 0 && ri % ROW_BYTES != 0 {
                let rs = bits << (8 - offset);
                collision |= bitmap.data[ri] & rs != 0;
                bitmap.data[ri] ^= rs;
            }
        }

        bitmap.dirty = true;
        collision
    }

    /// Copies the bitmap out and consumes the dirty flag.
    pub(crate) fn snapshot(&self) -> Frame {
        let mut bitmap = self.lock();
        let dirty = std::mem::replace(&mut bitmap.dirty, false);
        Frame {
            pixels: bitmap.data,
            dirty,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    const CORNER_SPRITE: [u8; 6] = [
        0b1111_1111,
        0b1100_0001,
        0b1001_1001,
        0b1001_1011,
        0b1000_0101,
        0b1111_1111,
    ];

    #[test]
    fn test_corner_edge_case() {
        let fb = FrameBuffer::new();

        // draw sprite precisely in the corner
        let collision = fb.draw(&CORNER_SPRITE, 60, 29);
        let frame = fb.snapshot();

        assert!(!collision);
        assert_eq!(frame.pixels[255], 0b0000_1001, "{frame:?}");
        assert_eq!(frame.pixels[239], 0b0000_1111);
        assert_eq!(frame.pixels[247], 0b0000_1100);
        // nothing wrapped to the top or to the left edge
        assert!(frame.pixels[..239].iter().all(|&b| b == 0));
        assert_eq!(frame.pixels[248], 0);
    }

    #[test]
    fn test_straddles_two_bytes() {
        let fb = FrameBuffer::new();
        fb.draw(&[0b1111_0000], 4, 0);
        let frame = fb.snapshot();
        assert_eq!(frame.pixels[0], 0b0000_1111);
        assert_eq!(frame.pixels[1], 0b0000_0000);

        fb.draw(&[0b1111_1111], 12, 1);
        let frame = fb.snapshot();
        assert_eq!(frame.pixels[9], 0b0000_1111);
        assert_eq!(frame.pixels[10], 0b1111_0000);
    }

    #[test]
    fn test_origin_wraps() {
        let fb = FrameBuffer::new();
        fb.draw(&[0b1000_0000], 64 + 3, 32 + 2);
        let frame = fb.snapshot();
        assert!(frame.pixel(3, 2));
        assert_eq!(frame.pixels.iter().map(|b| b.count_ones()).sum::<u32>(), 1);
    }

    #[test]
    fn test_collision_detection() {
        let fb = FrameBuffer::new();
        assert!(!fb.draw(&[0b1010_0000], 0, 0));
        assert!(!fb.draw(&[0b0101_0000], 0, 0));
        assert!(fb.draw(&[0b0001_0000], 0, 0));
        assert_eq!(fb.snapshot().pixels[0], 0b1110_0000);
    }

    #[test]
    fn test_collision_in_any_row_is_kept() {
        let fb = FrameBuffer::new();
        fb.draw(&[0b1000_0000], 0, 0);
        // collision happens on the first row only; later rows must not reset it
        assert!(fb.draw(&[0b1000_0000, 0b1000_0000, 0b1000_0000], 0, 0));
    }

    #[test]
    fn test_collision_on_right_half() {
        let fb = FrameBuffer::new();
        fb.draw(&[0b0100_0000], 16, 0);
        assert!(fb.draw(&[0b0010_0000], 15, 0));
        let frame = fb.snapshot();
        assert_eq!(frame.pixels[1], 0);
        assert_eq!(frame.pixels[2], 0);
    }

    #[test]
    fn test_draw_twice_erases() {
        let fb = FrameBuffer::new();
        fb.draw(&CORNER_SPRITE, 10, 10);
        assert!(fb.draw(&CORNER_SPRITE, 10, 10));
        assert!(fb.snapshot().pixels.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clear_and_dirty_consumed_once() {
        let fb = FrameBuffer::new();
        assert!(!fb.snapshot().dirty);

        fb.draw(&[0xFF], 0, 0);
        fb.clear();

        let frame = fb.snapshot();
        assert!(frame.dirty);
        assert!(frame.pixels.iter().all(|&b| b == 0));
        assert!(!fb.snapshot().dirty);
    }

    #[test]
    fn test_empty_sprite_still_marks_dirty() {
        let fb = FrameBuffer::new();
        assert!(!fb.draw(&[], 0, 0));
        assert!(fb.snapshot().dirty);
    }

    #[test]
    fn test_text_rendering() {
        let fb = FrameBuffer::new();
        fb.draw(&[0b1100_0000], 0, 0);
        let text = fb.snapshot().to_string();
        let first = text.lines().next().unwrap();
        assert!(first.starts_with("██ "));
        assert_eq!(text.lines().count(), usize::from(SCREEN_HEIGHT));
    }

    #[test]
    fn test_reader_never_sees_torn_sprite() {
        let fb = Arc::new(FrameBuffer::new());
        let writer = {
            let fb = Arc::clone(&fb);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    fb.draw(&[0xFF; 15], 0, 0);
                }
            })
        };

        for _ in 0..2_000 {
            let frame = fb.snapshot();
            let column: Vec<u8> = (0..15).map(|row| frame.pixels[row * ROW_BYTES]).collect();
            assert!(column.iter().all(|&b| b == column[0]), "{frame:?}");
        }

        writer.join().unwrap();
    }
}
