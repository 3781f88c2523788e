//! posebridge-osc/src/tracking/convert.rs
//!
//! Pure pose conversions: unit quaternion → Euler angles (degrees) and the
//! engine-space → OSC-space position mapping.

use super::{Quat, Vec3};

/// Fixed vertical offset added to the head position before transmission.
pub const HEAD_OFFSET: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.2 };

/// Decomposes a unit quaternion into roll(X)/pitch(Y)/yaw(Z) Euler angles,
/// in degrees.
///
/// The pitch term `asin(2(wy - zx))` is singular at the poles; when the
/// argument leaves [-1, 1] the pitch is assigned ±90° directly instead of
/// being fed to `asin` (or, worse, derived from a division by zero).
pub fn quaternion_to_euler(q: Quat) -> Vec3 {
    let Quat { w, x, y, z } = q;

    let roll = (2.0 * (w * x + y * z))
        .atan2(1.0 - 2.0 * (x * x + y * y))
        .to_degrees();

    let sinp = 2.0 * (w * y - z * x);
    let pitch = if sinp >= 1.0 {
        90.0
    } else if sinp <= -1.0 {
        -90.0
    } else {
        sinp.asin().to_degrees()
    };

    let yaw = (2.0 * (w * z + x * y))
        .atan2(1.0 - 2.0 * (y * y + z * z))
        .to_degrees();

    Vec3::new(roll, pitch, yaw)
}

/// Maps an engine-space position into the receiver's convention: the Z axis
/// flips sign, X and Y pass through. Applying it twice returns the input.
pub fn to_osc_position(p: Vec3) -> Vec3 {
    Vec3::new(p.x, p.y, -p.z)
}

/// Head positions get [`HEAD_OFFSET`] added in engine space before the
/// axis flip.
pub fn head_osc_position(p: Vec3) -> Vec3 {
    to_osc_position(Vec3::new(
        p.x + HEAD_OFFSET.x,
        p.y + HEAD_OFFSET.y,
        p.z + HEAD_OFFSET.z,
    ))
}
