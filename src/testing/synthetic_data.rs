//! Synthetic frame content
//!
//! Gradient frames whose pixels shift with the frame number, so consecutive
//! frames always differ and JPEG encoding sees realistic structure.

use crate::types::Frame;

/// Create an RGB8 gradient frame for `frame_number`.
pub fn synthetic_video_frame(frame_number: u64, width: u32, height: u32) -> Frame {
    let mut data = vec![0u8; width as usize * height as usize * 3];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = (y as usize * width as usize + x as usize) * 3;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    Frame::rgb(data, width, height).with_sequence(frame_number)
}
