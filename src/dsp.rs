use crate::models::Position;

/// Peak ceiling applied to every sample leaving the mixer.
pub const CLIP_LIMIT: f32 = 0.999;

/// Constant-angle pan law: x in [-1, 1] maps to an angle in [0, pi/2].
/// Hard left keeps only the cosine leg, hard right only the sine leg.
pub fn pan_gains(x: f32) -> (f32, f32) {
    let angle = (x.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Inverse-distance attenuation, unity at the listener.
pub fn distance_gain(pos: Position) -> f32 {
    1.0 / (1.0 + pos.distance() * 0.5)
}

/// Sources in front of the listener (+y) are slightly louder than behind.
pub fn depth_gain(pos: Position) -> f32 {
    0.75 + 0.25 * pos.y
}

pub fn hard_clip(sample: f32) -> f32 {
    sample.clamp(-CLIP_LIMIT, CLIP_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_pan_is_equal_on_both_sides() {
        let (l, r) = pan_gains(0.0);
        assert!((l - r).abs() < 1e-6);
        assert!((l - std::f32::consts::FRAC_PI_4.cos()).abs() < 1e-6);
    }

    #[test]
    fn hard_left_has_no_right_component() {
        let (l, r) = pan_gains(-1.0);
        assert!((l - 1.0).abs() < 1e-6);
        assert!(r.abs() < 1e-6);
    }

    #[test]
    fn hard_right_has_no_left_component() {
        let (l, r) = pan_gains(1.0);
        assert!(l.abs() < 1e-6);
        assert!((r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn distance_attenuates_and_origin_is_unity() {
        assert_eq!(distance_gain(Position::default()), 1.0);
        let far = Position::new(1.0, 1.0, 1.0);
        assert!(distance_gain(far) < 1.0);
    }

    #[test]
    fn forward_sources_are_louder_than_rear() {
        let front = Position::new(0.0, 1.0, 0.0);
        let back = Position::new(0.0, -1.0, 0.0);
        assert_eq!(depth_gain(front), 1.0);
        assert_eq!(depth_gain(back), 0.5);
    }

    #[test]
    fn clip_bounds_extremes() {
        assert_eq!(hard_clip(4.2), CLIP_LIMIT);
        assert_eq!(hard_clip(-4.2), -CLIP_LIMIT);
        assert_eq!(hard_clip(0.25), 0.25);
    }
}
