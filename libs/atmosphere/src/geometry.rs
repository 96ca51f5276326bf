// This file is part of OpenFA.
//
// OpenFA is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// OpenFA is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with OpenFA.  If not, see <http://www.gnu.org/licenses/>.

// Ray geometry inside the spherical shell between the ground and the top of
// the atmosphere. A ray is described by the distance r of its origin from
// the planet center and the cosine mu of its angle with the local zenith.
use crate::earth_consts::AtmosphereParameters;

#[inline]
pub fn clamp_cosine(mu: f64) -> f64 {
    mu.clamp(-1.0, 1.0)
}

#[inline]
pub fn clamp_distance(d: f64) -> f64 {
    d.max(0.0)
}

#[inline]
pub fn clamp_radius(atmosphere: &AtmosphereParameters, r: f64) -> f64 {
    r.clamp(atmosphere.bottom_radius, atmosphere.top_radius)
}

#[inline]
pub fn safe_sqrt(a: f64) -> f64 {
    a.max(0.0).sqrt()
}

/// Distance from the planet center to the point at distance `d` along the
/// ray, by the law of cosines.
#[inline]
pub fn radius_along_ray(r: f64, mu: f64, d: f64) -> f64 {
    (d * d + 2.0 * r * mu * d + r * r).sqrt()
}

pub fn distance_to_top_atmosphere_boundary(
    atmosphere: &AtmosphereParameters,
    r: f64,
    mu: f64,
) -> f64 {
    debug_assert!((-1.0..=1.0).contains(&mu));
    let discriminant = r * r * (mu * mu - 1.0) + atmosphere.top_radius * atmosphere.top_radius;
    clamp_distance(-r * mu + safe_sqrt(discriminant))
}

pub fn distance_to_bottom_atmosphere_boundary(
    atmosphere: &AtmosphereParameters,
    r: f64,
    mu: f64,
) -> f64 {
    debug_assert!((-1.0..=1.0).contains(&mu));
    let discriminant =
        r * r * (mu * mu - 1.0) + atmosphere.bottom_radius * atmosphere.bottom_radius;
    clamp_distance(-r * mu - safe_sqrt(discriminant))
}

pub fn ray_intersects_ground(atmosphere: &AtmosphereParameters, r: f64, mu: f64) -> bool {
    mu < 0.0
        && r * r * (mu * mu - 1.0) + atmosphere.bottom_radius * atmosphere.bottom_radius >= 0.0
}

pub fn distance_to_nearest_atmosphere_boundary(
    atmosphere: &AtmosphereParameters,
    r: f64,
    mu: f64,
    ray_r_mu_intersects_ground: bool,
) -> f64 {
    if ray_r_mu_intersects_ground {
        distance_to_bottom_atmosphere_boundary(atmosphere, r, mu)
    } else {
        distance_to_top_atmosphere_boundary(atmosphere, r, mu)
    }
}

// Hermite step; a zero width edge degenerates into a hard step.
pub fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    if edge0 == edge1 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
