use std::f64::consts::FRAC_PI_2;

/// Ground-referenced glide performance along one travel direction.
///
/// `glide_ratio` is altitude lost per meter of ground track; an infinite
/// ratio marks a direction that cannot be flown at all (the wind's
/// crosswind or headwind component exceeds what trim speed can counter).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveGlide {
    pub speed: f64,
    pub glide_ratio: f64,
}

impl EffectiveGlide {
    pub fn unreachable() -> Self {
        Self {
            speed: 0.0,
            glide_ratio: f64::INFINITY,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.glide_ratio.is_finite()
    }
}

/// Effective ground speed and glide ratio for travel at `trim_speed` with
/// base still-air ratio `glide_ratio`, given the angle between the travel
/// direction and the wind.
///
/// The crosswind component must be crabbed away, consuming part of the
/// airspeed; the remaining along-track speed is then shifted by the
/// tail/headwind component. Altitude is lost at the still-air sink rate
/// regardless of ground speed, so the effective ratio scales inversely
/// with the ground speed.
pub fn effective_glide(
    wind_angle: f64,
    wind_speed: f64,
    trim_speed: f64,
    glide_ratio: f64,
) -> EffectiveGlide {
    let side = wind_angle.sin() * wind_speed;
    let back = wind_angle.cos() * wind_speed;

    let rest_squared = trim_speed * trim_speed - side * side;
    if rest_squared <= 0.0 {
        return EffectiveGlide::unreachable();
    }

    let speed = rest_squared.sqrt() + back;
    if speed <= 0.0 {
        return EffectiveGlide::unreachable();
    }

    EffectiveGlide {
        speed,
        glide_ratio: glide_ratio / (speed / trim_speed),
    }
}

/// Travel bearing from cell `a` to cell `b` in grid coordinates:
/// `atan2(Δrow, Δcol)`, i.e. zero points along increasing columns (east).
pub fn travel_bearing(a: (usize, usize), b: (usize, usize)) -> f64 {
    let d_row = b.0 as f64 - a.0 as f64;
    let d_col = b.1 as f64 - a.1 as f64;
    d_row.atan2(d_col)
}

/// Angle between a travel bearing and the wind, in the rotated frame the
/// physics expects. `wind_direction` is meteorological: the direction the
/// wind comes *from*, measured clockwise from north.
pub fn effective_wind_angle(wind_direction: f64, bearing: f64) -> f64 {
    (-wind_direction + FRAC_PI_2) - bearing
}
