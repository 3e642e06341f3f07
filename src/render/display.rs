use crate::config::{DisplayConfig, SceneConfig};
use crate::tracker::{GarmentAnchor, GarmentCategory, PixelAnchor};

/// 2次元の点。どの座標空間かは使う側の文脈で決まる
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// カメラのネイティブ解像度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

impl VideoDimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// 表示領域（ウィンドウやキャンバス）の大きさ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerSize {
    pub width: f32,
    pub height: f32,
}

impl ContainerSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// "contain" レイアウトで映像を収めた矩形
///
/// 描画は scale を掛けてから (offset_x, offset_y) だけ平行移動する
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub offset_x: f32,
    pub offset_y: f32,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl DisplayRect {
    /// 0 や非有限の寸法では None
    pub fn fit(native: VideoDimensions, container: ContainerSize) -> Option<Self> {
        if !native.is_valid() {
            return None;
        }
        let (cw, ch) = (container.width, container.height);
        if !(cw.is_finite() && ch.is_finite()) || cw <= 0.0 || ch <= 0.0 {
            return None;
        }

        let nw = native.width as f32;
        let nh = native.height as f32;

        let rect = if nw / nh > cw / ch {
            // 横幅に合わせて上下に余白
            let scale = cw / nw;
            let height = nh * scale;
            Self {
                offset_x: 0.0,
                offset_y: (ch - height) / 2.0,
                width: cw,
                height,
                scale,
            }
        } else {
            let scale = ch / nh;
            let width = nw * scale;
            Self {
                offset_x: (cw - width) / 2.0,
                offset_y: 0.0,
                width,
                height: ch,
                scale,
            }
        };
        Some(rect)
    }

    pub fn contains(&self, p: Point2) -> bool {
        p.x >= self.offset_x
            && p.x <= self.offset_x + self.width
            && p.y >= self.offset_y
            && p.y <= self.offset_y + self.height
    }
}

/// ネイティブ画素 ⇔ 表示画素 ⇔ シーン単位 の変換
///
/// - 表示: 鏡像はネイティブ空間で x' = W - x としてから scale と offset を適用
/// - シーン: 画面中心が原点、Y 上向き、幅・高さがそれぞれ world_extent
#[derive(Debug, Clone)]
pub struct CoordinateTransformer {
    video: VideoDimensions,
    container: Option<ContainerSize>,
    display: Option<DisplayRect>,
    display_mirror: bool,
    world_extent: f32,
    scene_mirror: bool,
}

impl CoordinateTransformer {
    pub fn new(video: VideoDimensions, scene: &SceneConfig, display: &DisplayConfig) -> Self {
        Self {
            video,
            container: None,
            display: None,
            display_mirror: display.mirror,
            world_extent: scene.world_extent,
            scene_mirror: scene.mirror,
        }
    }

    pub fn video(&self) -> VideoDimensions {
        self.video
    }

    pub fn display_rect(&self) -> Option<DisplayRect> {
        self.display
    }

    pub fn world_extent(&self) -> f32 {
        self.world_extent
    }

    /// 表示領域のリサイズ時に呼ぶ
    pub fn set_container(&mut self, container: ContainerSize) {
        self.container = Some(container);
        self.display = DisplayRect::fit(self.video, container);
    }

    /// カメラ解像度が変わった場合は表示矩形も作り直す
    pub fn set_video(&mut self, video: VideoDimensions) {
        if self.video == video {
            return;
        }
        self.video = video;
        self.display = self
            .container
            .and_then(|container| DisplayRect::fit(video, container));
    }

    fn native_size(&self) -> (f32, f32) {
        (
            self.video.width.max(1) as f32,
            self.video.height.max(1) as f32,
        )
    }

    /// 表示矩形がまだない場合は None
    pub fn native_to_display(&self, p: Point2) -> Option<Point2> {
        let rect = self.display?;
        let (w, _) = self.native_size();
        let x = if self.display_mirror { w - p.x } else { p.x };
        Some(Point2::new(
            x * rect.scale + rect.offset_x,
            p.y * rect.scale + rect.offset_y,
        ))
    }

    pub fn display_to_native(&self, p: Point2) -> Option<Point2> {
        let rect = self.display?;
        let (w, _) = self.native_size();
        let x = (p.x - rect.offset_x) / rect.scale;
        let y = (p.y - rect.offset_y) / rect.scale;
        let x = if self.display_mirror { w - x } else { x };
        Some(Point2::new(x, y))
    }

    pub fn native_to_scene(&self, p: Point2) -> Point2 {
        let (w, h) = self.native_size();
        let k = self.world_extent;
        let x = (p.x / w - 0.5) * k;
        let y = -(p.y / h - 0.5) * k;
        Point2::new(if self.scene_mirror { -x } else { x }, y)
    }

    pub fn scene_to_native(&self, p: Point2) -> Point2 {
        let (w, h) = self.native_size();
        let k = self.world_extent;
        let sx = if self.scene_mirror { -p.x } else { p.x };
        Point2::new((sx / k + 0.5) * w, (-p.y / k + 0.5) * h)
    }

    /// 画素空間のアンカーをシーン単位に変換
    ///
    /// Y 軸が上向きになるので回転の符号は反転。シーン鏡像時はさらに反転して元に戻る
    pub fn anchor_to_scene(&self, anchor: &PixelAnchor, category: GarmentCategory) -> GarmentAnchor {
        let (w, h) = self.native_size();
        let k = self.world_extent;
        let position = self.native_to_scene(Point2::new(anchor.center_x, anchor.center_y));
        let rotation = if self.scene_mirror {
            anchor.rotation
        } else {
            -anchor.rotation
        };
        GarmentAnchor {
            category,
            position,
            width: anchor.width / w * k,
            height: anchor.height / h * k,
            rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-3;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < EPS
    }

    fn transformer(display_mirror: bool, scene_mirror: bool) -> CoordinateTransformer {
        let mut t = CoordinateTransformer::new(
            VideoDimensions::new(640, 480),
            &SceneConfig {
                world_extent: 12.0,
                mirror: scene_mirror,
            },
            &DisplayConfig {
                mirror: display_mirror,
            },
        );
        t.set_container(ContainerSize::new(1000.0, 1000.0));
        t
    }

    #[test]
    fn test_fit_wider_video_letterboxes_vertically() {
        let rect = DisplayRect::fit(VideoDimensions::new(640, 480), ContainerSize::new(1000.0, 1000.0)).unwrap();
        assert!(approx(rect.scale, 1000.0 / 640.0));
        assert!(approx(rect.width, 1000.0));
        assert!(approx(rect.height, 750.0));
        assert!(approx(rect.offset_x, 0.0));
        assert!(approx(rect.offset_y, 125.0));
    }

    #[test]
    fn test_fit_taller_video_pillarboxes() {
        let rect = DisplayRect::fit(VideoDimensions::new(480, 640), ContainerSize::new(1280.0, 720.0)).unwrap();
        assert!(approx(rect.scale, 720.0 / 640.0));
        assert!(approx(rect.height, 720.0));
        assert!(approx(rect.width, 540.0));
        assert!(approx(rect.offset_x, 370.0));
        assert!(approx(rect.offset_y, 0.0));
    }

    #[test]
    fn test_fit_same_aspect_fills() {
        let rect = DisplayRect::fit(VideoDimensions::new(640, 480), ContainerSize::new(1280.0, 960.0)).unwrap();
        assert!(approx(rect.scale, 2.0));
        assert!(approx(rect.offset_x, 0.0));
        assert!(approx(rect.offset_y, 0.0));
    }

    #[test]
    fn test_fit_rejects_degenerate() {
        assert!(DisplayRect::fit(VideoDimensions::new(0, 480), ContainerSize::new(100.0, 100.0)).is_none());
        assert!(DisplayRect::fit(VideoDimensions::new(640, 480), ContainerSize::new(0.0, 100.0)).is_none());
        assert!(DisplayRect::fit(VideoDimensions::new(640, 480), ContainerSize::new(f32::NAN, 100.0)).is_none());
        assert!(DisplayRect::fit(VideoDimensions::new(640, 480), ContainerSize::new(f32::INFINITY, 100.0)).is_none());
    }

    #[test]
    fn test_display_none_before_container() {
        let t = CoordinateTransformer::new(
            VideoDimensions::new(640, 480),
            &SceneConfig::default(),
            &DisplayConfig::default(),
        );
        assert!(t.native_to_display(Point2::new(1.0, 1.0)).is_none());
        assert!(t.display_to_native(Point2::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn test_display_mirror() {
        let t = transformer(true, false);
        let scale = 1000.0 / 640.0;
        // 左端は右端に映る
        let p = t.native_to_display(Point2::new(0.0, 0.0)).unwrap();
        assert!(approx(p.x, 640.0 * scale));
        assert!(approx(p.y, 125.0));

        let t = transformer(false, false);
        let p = t.native_to_display(Point2::new(100.0, 240.0)).unwrap();
        assert!(approx(p.x, 100.0 * scale));
        assert!(approx(p.y, 240.0 * scale + 125.0));
    }

    #[test]
    fn test_display_roundtrip() {
        for mirror in [true, false] {
            let t = transformer(mirror, false);
            let rect = t.display_rect().unwrap();
            for p in [
                Point2::new(rect.offset_x, rect.offset_y),
                Point2::new(500.0, 500.0),
                Point2::new(999.0, 870.0),
                Point2::new(12.5, 300.25),
            ] {
                assert!(rect.contains(p));
                let back = t.native_to_display(t.display_to_native(p).unwrap()).unwrap();
                assert!(approx(back.x, p.x), "{:?} -> {:?}", p, back);
                assert!(approx(back.y, p.y), "{:?} -> {:?}", p, back);
            }
        }
    }

    #[test]
    fn test_scene_mapping() {
        let t = transformer(true, false);
        let center = t.native_to_scene(Point2::new(320.0, 240.0));
        assert!(approx(center.x, 0.0));
        assert!(approx(center.y, 0.0));

        // 左上は (-6, +6)
        let top_left = t.native_to_scene(Point2::new(0.0, 0.0));
        assert!(approx(top_left.x, -6.0));
        assert!(approx(top_left.y, 6.0));

        let mirrored = transformer(true, true).native_to_scene(Point2::new(0.0, 0.0));
        assert!(approx(mirrored.x, 6.0));
        assert!(approx(mirrored.y, 6.0));
    }

    #[test]
    fn test_scene_roundtrip() {
        for scene_mirror in [true, false] {
            let t = transformer(true, scene_mirror);
            for p in [Point2::new(0.0, 0.0), Point2::new(123.4, 56.7), Point2::new(640.0, 480.0)] {
                let back = t.scene_to_native(t.native_to_scene(p));
                assert!(approx(back.x, p.x));
                assert!(approx(back.y, p.y));
            }
        }
    }

    #[test]
    fn test_set_video_refits() {
        let mut t = transformer(true, false);
        t.set_video(VideoDimensions::new(480, 640));
        let rect = t.display_rect().unwrap();
        assert!(approx(rect.height, 1000.0));
        assert!(approx(rect.width, 750.0));
    }

    #[test]
    fn test_anchor_to_scene() {
        let t = transformer(true, false);
        let anchor = PixelAnchor {
            center_x: 320.0,
            center_y: 120.0,
            width: 320.0,
            height: 240.0,
            rotation: 0.3,
        };
        let scene = t.anchor_to_scene(&anchor, GarmentCategory::TopLike);
        assert_eq!(scene.category, GarmentCategory::TopLike);
        assert!(approx(scene.position.x, 0.0));
        assert!(approx(scene.position.y, 3.0));
        assert!(approx(scene.width, 6.0));
        assert!(approx(scene.height, 6.0));
        assert!(approx(scene.rotation, -0.3));

        let mirrored = transformer(true, true).anchor_to_scene(&anchor, GarmentCategory::TopLike);
        assert!(approx(mirrored.rotation, 0.3));
    }
}
