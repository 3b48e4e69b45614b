//! Closed-form biomechanics: second moments of area, stress, reaction wood.

use std::f64::consts::{FRAC_PI_4, PI, TAU};

use crate::core::frame::Vec3;
use crate::error::{Error, Result};

/// Default modulus of rupture, Pa.
pub const DEFAULT_MODULUS_OF_RUPTURE: f64 = 50e6;
/// Default exponent of the branching radius rule.
pub const DEFAULT_RADIUS_EXPONENT: f64 = 2.49;

pub fn second_moment_of_area_circle(radius: f64) -> f64 {
    FRAC_PI_4 * radius.powi(4)
}

pub fn second_moment_of_area_circular_section(radius: f64, section: f64) -> f64 {
    (2.0 / 3.0) * radius.powi(3) * (section / 2.0).sin()
}

/// Annular ring of `thickness` outside `inner_radius`, restricted to an
/// angular `section` (radians, at most a full turn).
pub fn second_moment_of_area_annular_section(
    inner_radius: f64,
    thickness: f64,
    section: f64,
) -> Result<f64> {
    if section > TAU {
        return Err(Error::invalid(format!(
            "annular section must not exceed 2π, got {section}"
        )));
    }
    let outer = inner_radius + thickness;
    Ok(0.125 * (outer.powi(4) - inner_radius.powi(4)) * (section + section.sin()))
}

/// Divides the cosine of a same-side bend before `acos`, so a straight
/// internode still reads a small inclination.
const INCLINATION_DAMPING: f64 = 1.0001;

/// Reaction-wood angle in `[0, π]` produced by the bend between
/// `previous_heading` and the current frame.
pub fn reaction_wood_target(up: &Vec3, heading: &Vec3, previous_heading: &Vec3) -> f64 {
    let cos_gh = Vec3::z().dot(heading);
    let cos_pu = previous_heading.dot(up);
    let cos_ph = previous_heading.dot(heading);

    // acos outside its domain only comes from rounding; read it as no bend
    let acos = |x: f64| if (-1.0..=1.0).contains(&x) { x.acos() } else { 0.0 };
    let inclination = if cos_pu * cos_ph >= 0.0 {
        acos(cos_ph / INCLINATION_DAMPING)
    } else {
        -acos(cos_ph)
    };

    let target = TAU * (0.1635 * (1.0 - cos_gh) - 0.1778 * inclination);
    target.clamp(0.0, PI)
}

pub fn stress(torque: &Vec3, radius: f64) -> f64 {
    torque.norm() * radius / (FRAC_PI_4 * radius.powi(4))
}

pub fn rupture(torque: &Vec3, radius: f64, modulus_of_rupture: f64) -> bool {
    stress(torque, radius) > modulus_of_rupture
}

/// Radius below a junction of two branches of radii `ra` and `rb`.
pub fn get_new_radius(ra: f64, rb: f64, exponent: f64) -> f64 {
    (ra.powf(exponent) + rb.powf(exponent)).powf(1.0 / exponent)
}
