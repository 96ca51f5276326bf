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
use crate::{
    earth_consts::{AtmosphereParameters, DensityProfile},
    geometry::{
        clamp_cosine, clamp_radius, distance_to_top_atmosphere_boundary, radius_along_ray,
        safe_sqrt, smoothstep,
    },
    table_helpers::{r_mu_from_transmittance_uv, transmittance_uv_from_r_mu, TransmittanceTextureSize},
    texture::{to_texel, Texture2d},
};
use log::trace;
use nalgebra::{Vector2, Vector4};
use rayon::prelude::*;

const OPTICAL_LENGTH_SAMPLE_COUNT: usize = 500;

/// Read-only access to the transmittance from a point at radius `r` to the
/// top of the atmosphere, along a ray with zenith cosine `mu`. Shared by
/// every task of a parallel pass.
pub trait TransmittanceLookup: Sync {
    fn transmittance_to_top_atmosphere_boundary(
        &self,
        atmosphere: &AtmosphereParameters,
        r: f64,
        mu: f64,
    ) -> Vector4<f64>;
}

pub fn compute_optical_length_to_top_atmosphere_boundary(
    atmosphere: &AtmosphereParameters,
    profile: &DensityProfile,
    r: f64,
    mu: f64,
) -> f64 {
    let dx = distance_to_top_atmosphere_boundary(atmosphere, r, mu)
        / OPTICAL_LENGTH_SAMPLE_COUNT as f64;
    let mut result = 0f64;
    for i in 0..=OPTICAL_LENGTH_SAMPLE_COUNT {
        let d_i = i as f64 * dx;
        let r_i = radius_along_ray(r, mu, d_i);
        let y_i = profile.density(r_i - atmosphere.bottom_radius);
        let weight_i = if i == 0 || i == OPTICAL_LENGTH_SAMPLE_COUNT {
            0.5
        } else {
            1.0
        };
        result += y_i * weight_i * dx;
    }
    result
}

pub fn compute_transmittance_to_top_atmosphere_boundary(
    atmosphere: &AtmosphereParameters,
    r: f64,
    mu: f64,
) -> Vector4<f64> {
    let rayleigh = atmosphere.rayleigh_scattering_coefficient
        * compute_optical_length_to_top_atmosphere_boundary(
            atmosphere,
            &atmosphere.rayleigh_density,
            r,
            mu,
        );
    let mie = atmosphere.mie_extinction_coefficient
        * compute_optical_length_to_top_atmosphere_boundary(
            atmosphere,
            &atmosphere.mie_density,
            r,
            mu,
        );
    let absorption = atmosphere.absorption_extinction_coefficient
        * compute_optical_length_to_top_atmosphere_boundary(
            atmosphere,
            &atmosphere.absorption_density,
            r,
            mu,
        );
    (-(rayleigh + mie + absorption)).map(f64::exp)
}

/// The transmittance to the top of the atmosphere, tabulated over (r, mu).
pub struct TransmittanceTable {
    size: TransmittanceTextureSize,
    texture: Texture2d,
}

impl TransmittanceTable {
    pub fn build(atmosphere: &AtmosphereParameters, size: TransmittanceTextureSize) -> Self {
        trace!(
            "building {}x{} transmittance table",
            size.width,
            size.height
        );
        let mut texture = Texture2d::new(size.width, size.height);
        let width = size.width as usize;
        texture
            .texels_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, texel)| {
                let uv = Vector2::new(
                    ((i % width) as f64 + 0.5) / f64::from(size.width),
                    ((i / width) as f64 + 0.5) / f64::from(size.height),
                );
                let (r, mu) = r_mu_from_transmittance_uv(atmosphere, &size, uv);
                *texel = to_texel(compute_transmittance_to_top_atmosphere_boundary(
                    atmosphere, r, mu,
                ));
            });
        Self { size, texture }
    }

    pub fn size(&self) -> TransmittanceTextureSize {
        self.size
    }

    pub fn texture(&self) -> &Texture2d {
        &self.texture
    }
}

impl TransmittanceLookup for TransmittanceTable {
    fn transmittance_to_top_atmosphere_boundary(
        &self,
        atmosphere: &AtmosphereParameters,
        r: f64,
        mu: f64,
    ) -> Vector4<f64> {
        self.texture
            .sample(transmittance_uv_from_r_mu(atmosphere, &self.size, r, mu))
    }
}

// Component-wise `num / den`, capped at 1. An opaque denominator means no
// light gets through at all.
fn transmittance_ratio(num: Vector4<f64>, den: Vector4<f64>) -> Vector4<f64> {
    num.zip_map(&den, |n, d| if d > 0.0 { (n / d).min(1.0) } else { 0.0 })
}

/// Transmittance between the point at radius `r` and the point at distance
/// `d` along the ray (r, mu). Rays that hit the ground are evaluated in the
/// opposite direction so that the lookup never crosses the ground.
pub fn get_transmittance(
    atmosphere: &AtmosphereParameters,
    transmittance: &impl TransmittanceLookup,
    r: f64,
    mu: f64,
    d: f64,
    ray_r_mu_intersects_ground: bool,
) -> Vector4<f64> {
    let r_d = clamp_radius(atmosphere, radius_along_ray(r, mu, d));
    let mu_d = clamp_cosine((r * mu + d) / r_d);
    if ray_r_mu_intersects_ground {
        transmittance_ratio(
            transmittance.transmittance_to_top_atmosphere_boundary(atmosphere, r_d, -mu_d),
            transmittance.transmittance_to_top_atmosphere_boundary(atmosphere, r, -mu),
        )
    } else {
        transmittance_ratio(
            transmittance.transmittance_to_top_atmosphere_boundary(atmosphere, r, mu),
            transmittance.transmittance_to_top_atmosphere_boundary(atmosphere, r_d, mu_d),
        )
    }
}

/// Transmittance to the sun, scaled by the fraction of the sun disc that is
/// above the horizon.
pub fn get_transmittance_to_sun(
    atmosphere: &AtmosphereParameters,
    transmittance: &impl TransmittanceLookup,
    r: f64,
    mu_s: f64,
) -> Vector4<f64> {
    let sin_theta_h = atmosphere.bottom_radius / r;
    let cos_theta_h = -safe_sqrt(1.0 - sin_theta_h * sin_theta_h);
    let visible = smoothstep(
        -sin_theta_h * atmosphere.sun_angular_radius,
        sin_theta_h * atmosphere.sun_angular_radius,
        mu_s - cos_theta_h,
    );
    transmittance.transmittance_to_top_atmosphere_boundary(atmosphere, r, mu_s) * visible
}
