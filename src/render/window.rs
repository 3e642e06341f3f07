use anyhow::Result;
use minifb::{Key, Window, WindowOptions};
use opencv::core::Mat;
use opencv::prelude::*;

use crate::render::display::{CoordinateTransformer, Point2};
use crate::render::skeleton::{GARMENT_COLOR, KEYPOINT_COLOR, LOW_CONFIDENCE_COLOR, SKELETON_COLOR};
use crate::session::FrameSnapshot;
use crate::tracker::GarmentAnchor;

/// 余白の色
const BACKGROUND: u32 = 0x202020;

/// minifbを使用したデバッグ表示
///
/// 映像は "contain" で収め、骨格と衣服の枠をシーン座標から描き戻す
pub struct MinifbRenderer {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl MinifbRenderer {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            buffer: vec![BACKGROUND; width * height],
            width,
            height,
        })
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    pub fn is_key_down(&self, key: Key) -> bool {
        self.window.is_key_down(key)
    }

    /// BGR Mat を表示矩形に最近傍で描く。鏡像は transformer の設定に従う
    pub fn draw_frame(&mut self, frame: &Mat, transformer: &CoordinateTransformer) -> Result<()> {
        self.buffer.fill(BACKGROUND);
        let Some(rect) = transformer.display_rect() else {
            return Ok(());
        };
        let cols = frame.cols();
        let rows = frame.rows();

        let x0 = rect.offset_x.max(0.0) as usize;
        let y0 = rect.offset_y.max(0.0) as usize;
        let x1 = ((rect.offset_x + rect.width) as usize).min(self.width);
        let y1 = ((rect.offset_y + rect.height) as usize).min(self.height);

        for y in y0..y1 {
            for x in x0..x1 {
                let Some(src) = transformer.display_to_native(Point2::new(x as f32 + 0.5, y as f32 + 0.5)) else {
                    continue;
                };
                let sx = (src.x as i32).clamp(0, cols - 1);
                let sy = (src.y as i32).clamp(0, rows - 1);
                let pixel = frame.at_2d::<opencv::core::Vec3b>(sy, sx)?;
                // BGR -> RGB -> u32
                let r = pixel[2] as u32;
                let g = pixel[1] as u32;
                let b = pixel[0] as u32;
                self.buffer[y * self.width + x] = (r << 16) | (g << 8) | b;
            }
        }

        Ok(())
    }

    /// 骨格・キーポイント・衣服の枠を描く
    pub fn draw_snapshot(&mut self, snapshot: &FrameSnapshot, transformer: &CoordinateTransformer, confidence_threshold: f32) {
        for segment in &snapshot.skeleton {
            let start = self.scene_to_screen(segment.start, transformer);
            let end = self.scene_to_screen(segment.end, transformer);
            if let (Some((x0, y0)), Some((x1, y1))) = (start, end) {
                self.draw_line(x0, y0, x1, y1, SKELETON_COLOR);
            }
        }

        if let Some(pose) = &snapshot.pose {
            for kp in pose.keypoints.values() {
                let Some(p) = transformer.native_to_display(Point2::new(kp.x, kp.y)) else {
                    continue;
                };
                let color = if kp.is_valid(confidence_threshold) {
                    KEYPOINT_COLOR
                } else {
                    LOW_CONFIDENCE_COLOR
                };
                self.draw_circle(p.x as i32, p.y as i32, 4, color);
            }
        }

        for garment in &snapshot.garments {
            self.draw_garment(&garment.anchor, transformer);
        }
    }

    /// 回転した矩形。角をシーン座標で求めてから画面に写す
    fn draw_garment(&mut self, anchor: &GarmentAnchor, transformer: &CoordinateTransformer) {
        let (sin, cos) = anchor.rotation.sin_cos();
        let hw = anchor.width / 2.0;
        let hh = anchor.height / 2.0;
        let corners: Vec<Option<(i32, i32)>> = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)]
            .iter()
            .map(|&(dx, dy)| {
                let p = Point2::new(
                    anchor.position.x + dx * cos - dy * sin,
                    anchor.position.y + dx * sin + dy * cos,
                );
                self.scene_to_screen(p, transformer)
            })
            .collect();

        for i in 0..corners.len() {
            if let (Some((x0, y0)), Some((x1, y1))) = (corners[i], corners[(i + 1) % corners.len()]) {
                self.draw_line(x0, y0, x1, y1, GARMENT_COLOR);
            }
        }
        if let Some((cx, cy)) = self.scene_to_screen(anchor.position, transformer) {
            self.draw_circle(cx, cy, 3, GARMENT_COLOR);
        }
    }

    fn scene_to_screen(&self, p: Point2, transformer: &CoordinateTransformer) -> Option<(i32, i32)> {
        let native = transformer.scene_to_native(p);
        transformer
            .native_to_display(native)
            .map(|d| (d.x as i32, d.y as i32))
    }

    /// バッファをウィンドウに表示
    pub fn update(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }

    /// Bresenhamのアルゴリズムで線を描画
    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.set_pixel(x, y, color);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }
}
