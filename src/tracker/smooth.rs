use std::collections::HashMap;
use std::f32::consts::{PI, TAU};

use crate::config::SmoothConfig;
use crate::render::Point2;

use super::anchor::GarmentAnchor;

/// α の下限。0 だと永久に追従しない
const MIN_ALPHA: f32 = 1e-3;

/// 角度を (-π, π] に折り返す
pub fn wrap_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a <= -PI {
        a += TAU;
    } else if a > PI {
        a -= TAU;
    }
    a
}

/// EMAベースのアンカー平滑化フィルタ
///
/// 位置・大きさ: 成分ごとのEMA
/// 回転: 最短方向の角度差に対するEMA
///
/// set_target は新しいアンカーが得られたフレームだけ、step は描画フレームごとに呼ぶ
#[derive(Debug, Clone)]
pub struct AnchorSmoother {
    alpha: f32,
    prev: Option<GarmentAnchor>,
    target: Option<GarmentAnchor>,
}

impl AnchorSmoother {
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(MIN_ALPHA, 1.0)
        } else {
            MIN_ALPHA
        };
        Self {
            alpha,
            prev: None,
            target: None,
        }
    }

    pub fn from_config(config: &SmoothConfig) -> Self {
        Self::new(config.alpha)
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn set_target(&mut self, anchor: GarmentAnchor) {
        self.target = Some(anchor);
    }

    /// 目標に一歩近づける。目標がなければ None、初回は目標をそのまま返す
    pub fn step(&mut self) -> Option<GarmentAnchor> {
        let target = self.target?;
        let prev = match self.prev {
            Some(prev) => prev,
            None => {
                self.prev = Some(target);
                return Some(target);
            }
        };

        let a = self.alpha;
        let lerp = |from: f32, to: f32| from + (to - from) * a;
        let delta = wrap_angle(target.rotation - prev.rotation);

        let result = GarmentAnchor {
            category: target.category,
            position: Point2::new(
                lerp(prev.position.x, target.position.x),
                lerp(prev.position.y, target.position.y),
            ),
            width: lerp(prev.width, target.width),
            height: lerp(prev.height, target.height),
            rotation: wrap_angle(prev.rotation + delta * a),
        };
        self.prev = Some(result);
        Some(result)
    }

    pub fn apply(&mut self, anchor: GarmentAnchor) -> GarmentAnchor {
        self.set_target(anchor);
        self.step().unwrap_or(anchor)
    }

    pub fn reset(&mut self) {
        self.prev = None;
        self.target = None;
    }
}

/// カタログ内の位置と id の組。同じアイテムが2回並んでも別々に平滑化する
pub type GarmentKey = (String, usize);

/// 衣服インスタンスごとの AnchorSmoother
#[derive(Debug, Clone)]
pub struct GarmentSmoother {
    alpha: f32,
    states: HashMap<GarmentKey, AnchorSmoother>,
}

impl GarmentSmoother {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            states: HashMap::new(),
        }
    }

    pub fn from_config(config: &SmoothConfig) -> Self {
        Self::new(config.alpha)
    }

    /// 初めてのインスタンスなら状態を作る
    pub fn set_target(&mut self, item_id: &str, index: usize, anchor: GarmentAnchor) {
        let alpha = self.alpha;
        self.states
            .entry((item_id.to_string(), index))
            .or_insert_with(|| AnchorSmoother::new(alpha))
            .set_target(anchor);
    }

    /// 目標を持つことのないインスタンスは状態自体がないので None
    pub fn step(&mut self, item_id: &str, index: usize) -> Option<GarmentAnchor> {
        self.states
            .get_mut(&(item_id.to_string(), index))
            .and_then(|s| s.step())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::GarmentCategory;

    fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    fn anchor(x: f32, y: f32, rotation: f32) -> GarmentAnchor {
        GarmentAnchor {
            category: GarmentCategory::TopLike,
            position: Point2::new(x, y),
            width: 3.0,
            height: 4.0,
            rotation,
        }
    }

    #[test]
    fn test_first_frame_passthrough() {
        let mut s = AnchorSmoother::new(0.2);
        let a = anchor(1.0, 2.0, 0.5);
        assert_eq!(s.apply(a), a);
    }

    #[test]
    fn test_ema_step() {
        let mut s = AnchorSmoother::new(0.2);
        s.apply(anchor(0.0, 0.0, 0.0));
        let result = s.apply(anchor(10.0, 0.0, 0.0));
        assert!(approx_eq_f32(result.position.x, 2.0, 1e-6));
        assert!(approx_eq_f32(result.position.y, 0.0, 1e-6));
    }

    #[test]
    fn test_converges_without_overshoot() {
        let mut s = AnchorSmoother::new(0.2);
        s.apply(anchor(0.0, 0.0, 0.0));
        let mut last = 0.0;
        for _ in 0..100 {
            let x = s.apply(anchor(10.0, 0.0, 0.0)).position.x;
            assert!(x >= last);
            assert!(x <= 10.0);
            last = x;
        }
        assert!(approx_eq_f32(last, 10.0, 1e-3));
    }

    #[test]
    fn test_strictly_increasing_early() {
        let mut s = AnchorSmoother::new(0.2);
        s.apply(anchor(0.0, 0.0, 0.0));
        let mut last = 0.0;
        for _ in 0..10 {
            let x = s.apply(anchor(10.0, 0.0, 0.0)).position.x;
            assert!(x > last);
            last = x;
        }
    }

    #[test]
    fn test_no_smoothing() {
        let mut s = AnchorSmoother::new(1.0);
        s.apply(anchor(0.0, 0.0, 0.0));
        let target = anchor(4.0, 5.0, 1.0);
        let result = s.apply(target);
        assert!(approx_eq_f32(result.position.x, 4.0, 1e-6));
        assert!(approx_eq_f32(result.rotation, 1.0, 1e-6));
    }

    #[test]
    fn test_alpha_clamped() {
        assert_eq!(AnchorSmoother::new(5.0).alpha(), 1.0);
        assert!(AnchorSmoother::new(0.0).alpha() > 0.0);
        assert!(AnchorSmoother::new(-1.0).alpha() > 0.0);
        assert!(AnchorSmoother::new(f32::NAN).alpha() > 0.0);
    }

    #[test]
    fn test_rotation_shortest_path() {
        let mut s = AnchorSmoother::new(0.5);
        // 179° から -179° へは 2° だけ回る
        let from = 179.0f32.to_radians();
        let to = -179.0f32.to_radians();
        s.apply(anchor(0.0, 0.0, from));
        let result = s.apply(anchor(0.0, 0.0, to));
        let expected = wrap_angle(180.0f32.to_radians());
        assert!(approx_eq_f32(result.rotation.abs(), expected.abs(), 1e-4));
        assert!(result.rotation > -PI && result.rotation <= PI);
    }

    #[test]
    fn test_wrap_angle() {
        assert!(approx_eq_f32(wrap_angle(0.0), 0.0, 1e-6));
        assert!(approx_eq_f32(wrap_angle(TAU + 0.5), 0.5, 1e-5));
        assert!(approx_eq_f32(wrap_angle(-TAU - 0.5), -0.5, 1e-5));
        assert!(approx_eq_f32(wrap_angle(PI), PI, 1e-6));
        assert!(approx_eq_f32(wrap_angle(-PI), PI, 1e-6));
    }

    #[test]
    fn test_step_holds_last_target() {
        let mut s = AnchorSmoother::new(0.2);
        assert!(s.step().is_none());
        s.apply(anchor(0.0, 0.0, 0.0));
        s.set_target(anchor(10.0, 0.0, 0.0));
        // 新しい目標がなくても step のたびに近づく
        let a = s.step().unwrap().position.x;
        let b = s.step().unwrap().position.x;
        let c = s.step().unwrap().position.x;
        assert!(a < b && b < c && c < 10.0);
    }

    #[test]
    fn test_reset() {
        let mut s = AnchorSmoother::new(0.1);
        s.apply(anchor(1.0, 2.0, 0.0));
        s.reset();
        assert!(s.step().is_none());
        let next = anchor(4.0, 5.0, 0.0);
        assert_eq!(s.apply(next), next);
    }

    #[test]
    fn test_garment_smoother_keys_by_instance() {
        let mut g = GarmentSmoother::new(0.2);
        assert!(g.step("shirt", 0).is_none());

        g.set_target("shirt", 0, anchor(0.0, 0.0, 0.0));
        g.set_target("shirt", 1, anchor(5.0, 0.0, 0.0));
        assert_eq!(g.len(), 2);
        assert_eq!(g.step("shirt", 0).unwrap().position.x, 0.0);
        assert_eq!(g.step("shirt", 1).unwrap().position.x, 5.0);

        g.set_target("shirt", 0, anchor(10.0, 0.0, 0.0));
        assert!(approx_eq_f32(g.step("shirt", 0).unwrap().position.x, 2.0, 1e-6));
        // 別インスタンスは影響を受けない
        assert_eq!(g.step("shirt", 1).unwrap().position.x, 5.0);

        g.reset();
        assert!(g.is_empty());
    }
}
