//! Host-side level-set helpers, matching the kernels in common.wgsl.

/// Distance written where no shape has been drawn.
pub const FAR_DISTANCE: f32 = 1000.0;

/// Fraction of the segment between two level-set samples that is inside
/// (negative).
pub fn fraction_inside(a: f32, b: f32) -> f32 {
    match (a < 0.0, b < 0.0) {
        (true, true) => 1.0,
        (true, false) => a / (a - b),
        (false, true) => b / (b - a),
        (false, false) => 0.0,
    }
}

/// Open fraction of the face between two solid level-set samples.
pub fn face_weight(solid_a: f32, solid_b: f32) -> f32 {
    (1.0 - fraction_inside(solid_a, solid_b)).clamp(0.0, 1.0)
}
