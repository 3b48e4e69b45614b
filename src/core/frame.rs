//! Heading/up/left frames and the rotations applied to them.

use nalgebra::Vector3;

use crate::error::{Error, Result};

pub type Vec3 = Vector3<f64>;

/// Below this rotation angle a frame is left untouched.
pub const MIN_REORIENTATION_ANGLE: f64 = 0.01;

/// Local orthonormal frame. `up` is always `heading × left`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub heading: Vec3,
    pub up: Vec3,
    pub left: Vec3,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            heading: Vec3::new(0.0, 1.0, 0.0),
            up: Vec3::new(1.0, 0.0, 0.0),
            left: Vec3::new(0.0, 0.0, 1.0),
        }
    }
}

impl Frame {
    /// Build a frame from a heading and an approximate left vector.
    ///
    /// `left` is projected onto the plane orthogonal to `heading`.
    pub fn new(heading: Vec3, left: Vec3) -> Result<Self> {
        let h = heading
            .try_normalize(f64::EPSILON)
            .ok_or_else(|| Error::invalid("frame heading has zero length"))?;
        let l = (left - h * left.dot(&h))
            .try_normalize(f64::EPSILON)
            .ok_or_else(|| Error::invalid("frame left is parallel to heading"))?;
        Ok(Self {
            heading: h,
            up: h.cross(&l),
            left: l,
        })
    }

    /// Vertical frame used for the trunk.
    pub fn vertical() -> Self {
        let heading = Vec3::z();
        let left = Vec3::y();
        Self {
            heading,
            up: heading.cross(&left),
            left,
        }
    }
}

/// Rotate `target` about `axis` by `angle` radians.
///
/// The rotation matrix is expanded term by term; the order of operations is
/// kept fixed so results are reproducible across runs.
pub fn rotate(axis: &Vec3, angle: f64, target: &Vec3) -> Vec3 {
    let axis = axis.try_normalize(0.0).unwrap_or(*axis);
    let (x, y, z) = (axis.x, axis.y, axis.z);

    let c = angle.cos();
    let t2 = 1.0 - c;
    let t6 = t2 * x;
    let t7 = t6 * y;
    let s = angle.sin();
    let t9 = s * z;
    let t11 = t6 * z;
    let t12 = s * y;
    let t19 = t2 * y * z;
    let t20 = s * x;
    let t24 = z * z;

    let r00 = c + t2 * x * x;
    let r01 = t7 - t9;
    let r02 = t11 + t12;
    let r10 = t7 + t9;
    let r11 = c + t2 * y * y;
    let r12 = t19 - t20;
    let r20 = t11 - t12;
    let r21 = t19 + t20;
    let r22 = c + t2 * t24;

    Vec3::new(
        r00 * target.x + r01 * target.y + r02 * target.z,
        r10 * target.x + r11 * target.y + r12 * target.z,
        r20 * target.x + r21 * target.y + r22 * target.z,
    )
}

fn normalized(v: Vec3) -> Vec3 {
    v.try_normalize(0.0).unwrap_or(v)
}

/// Bend a frame under `rotation_velocity` over an internode of `length`.
pub fn reorient_frame(initial: &Frame, rotation_velocity: &Vec3, length: f64) -> Frame {
    let rv_norm = rotation_velocity.norm();
    let axis = if rv_norm > 0.0 {
        *rotation_velocity / rv_norm
    } else {
        *rotation_velocity
    };
    reorient_frame_about(initial, &axis, rv_norm, length)
}

/// Same as [`reorient_frame`] for a velocity already split into a unit
/// `axis` and its norm.
pub fn reorient_frame_about(initial: &Frame, axis: &Vec3, rv_norm: f64, length: f64) -> Frame {
    let mut heading = normalized(initial.heading);
    let mut left = normalized(initial.left);

    let angle = rv_norm * length;
    if angle.abs() >= MIN_REORIENTATION_ANGLE {
        heading = rotate(axis, angle, &heading);
        left = rotate(axis, angle, &left);
    }

    let heading = normalized(heading);
    let left = normalized(left);
    Frame {
        heading,
        up: heading.cross(&left),
        left,
    }
}

/// Orient a lateral frame: branch away about `left`, then spin about the
/// parent heading.
pub fn rotate_frame_at_branch(
    initial: &Frame,
    branching_angle: f64,
    phyllotactic_angle: f64,
) -> Frame {
    let heading = normalized(rotate(&initial.left, branching_angle, &initial.heading));
    let up = normalized(rotate(&initial.left, branching_angle, &initial.up));

    let heading = normalized(rotate(&initial.heading, phyllotactic_angle, &heading));
    let up = normalized(rotate(&initial.heading, phyllotactic_angle, &up));

    Frame {
        heading,
        up,
        left: up.cross(&heading),
    }
}
