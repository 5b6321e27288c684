/// Fixed-size pixel buffer in the display's native byte order.
///
/// Channel bytes 0, 1, 2 of each pixel are written in place; on a 32-bit
/// display the fourth byte is padding and is left untouched.
#[derive(Clone, Debug)]
pub struct Canvas {
    pub width: usize,
    pub height: usize,
    pub bits_per_pixel: u8,
    pub bytes_per_pixel: usize,
    pub bytes_per_row: usize,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: usize, height: usize, bits_per_pixel: u8) -> Self {
        let bytes_per_pixel = bits_per_pixel as usize / 8;
        let bytes_per_row = width * bytes_per_pixel;
        Self {
            width,
            height,
            bits_per_pixel,
            bytes_per_pixel,
            bytes_per_row,
            pixels: vec![0u8; bytes_per_row * height],
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn offset(&self, x: usize, y: usize) -> usize {
        x * self.bytes_per_pixel + y * self.bytes_per_row
    }

    /// Write the three channel bytes of pixel (x, y).
    pub fn put(&mut self, x: usize, y: usize, channels: [u8; 3]) {
        let at = self.offset(x, y);
        self.pixels[at..at + 3].copy_from_slice(&channels);
    }

    #[cfg(test)]
    pub fn get(&self, x: usize, y: usize) -> [u8; 3] {
        let at = self.offset(x, y);
        [self.pixels[at], self.pixels[at + 1], self.pixels[at + 2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_follows_depth() {
        let c32 = Canvas::new(10, 4, 32);
        assert_eq!(c32.bytes_per_row, 40);
        assert_eq!(c32.pixels().len(), 160);
        assert_eq!(c32.offset(2, 1), 48);

        let c24 = Canvas::new(10, 4, 24);
        assert_eq!(c24.bytes_per_row, 30);
        assert_eq!(c24.offset(2, 1), 36);
    }

    #[test]
    fn put_leaves_padding_byte() {
        let mut canvas = Canvas::new(2, 1, 32);
        canvas.put(1, 0, [1, 2, 3]);
        assert_eq!(canvas.pixels(), &[0, 0, 0, 0, 1, 2, 3, 0]);
        assert_eq!(canvas.get(1, 0), [1, 2, 3]);
    }
}
