//! Frame sampling.
//!
//! The guest renders a native 640x400 RGBA frame into linear memory and passes
//! its offset to `js_draw_screen`. Output pixels are sampled at `(2x, 2y)`.

/// Native render width.
pub const DOOM_WIDTH: u32 = 640;
/// Native render height.
pub const DOOM_HEIGHT: u32 = 400;
/// Size of one native frame in bytes.
pub const FRAME_BYTES: usize = (DOOM_WIDTH * DOOM_HEIGHT * 4) as usize;

/// One sampled output pixel.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Visit every pixel of a `width` x `height` output, sampled from `frame`.
///
/// Channels that fall outside `frame` read as 0.
pub fn downsample(frame: &[u8], width: u32, height: u32, mut on_pixel: impl FnMut(Pixel)) {
    let channel = |i: usize| frame.get(i).copied().unwrap_or(0);
    for y in 0..height {
        for x in 0..width {
            let src_x = x as usize * 2;
            let src_y = y as usize * 2;
            let idx = (src_y * DOOM_WIDTH as usize + src_x) * 4;
            on_pixel(Pixel {
                x,
                y,
                r: channel(idx),
                g: channel(idx + 1),
                b: channel(idx + 2),
                a: channel(idx + 3),
            });
        }
    }
}
