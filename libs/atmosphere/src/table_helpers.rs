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

// Mappings between texture coordinates and the physical parameters that
// each table is indexed by. The mappings are non-linear so that texels
// concentrate near the horizon and near the ground, where the tables change
// fastest.
use crate::{
    earth_consts::AtmosphereParameters,
    error::AtmosphereError,
    geometry::{clamp_cosine, clamp_radius, distance_to_top_atmosphere_boundary, safe_sqrt},
};
use nalgebra::{Vector2, Vector3, Vector4};

pub const TRANSMITTANCE_TEXTURE_WIDTH: u32 = 256;
pub const TRANSMITTANCE_TEXTURE_HEIGHT: u32 = 64;

pub const SCATTERING_TEXTURE_R_SIZE: u32 = 32;
pub const SCATTERING_TEXTURE_MU_SIZE: u32 = 128;
pub const SCATTERING_TEXTURE_MU_S_SIZE: u32 = 32;
pub const SCATTERING_TEXTURE_NU_SIZE: u32 = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransmittanceTextureSize {
    pub width: u32,
    pub height: u32,
}

impl Default for TransmittanceTextureSize {
    fn default() -> Self {
        Self {
            width: TRANSMITTANCE_TEXTURE_WIDTH,
            height: TRANSMITTANCE_TEXTURE_HEIGHT,
        }
    }
}

impl TransmittanceTextureSize {
    pub fn validate(&self) -> Result<(), AtmosphereError> {
        check_size("transmittance width", self.width, 2)?;
        check_size("transmittance height", self.height, 2)?;
        check_texel_count("transmittance", &[self.width, self.height])
    }
}

/// The 4D scattering table, packed into a 3D texture by laying the nu
/// slices out side by side along x.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScatteringTextureSize {
    pub r: u32,
    pub mu: u32,
    pub mu_s: u32,
    pub nu: u32,
}

impl Default for ScatteringTextureSize {
    fn default() -> Self {
        Self {
            r: SCATTERING_TEXTURE_R_SIZE,
            mu: SCATTERING_TEXTURE_MU_SIZE,
            mu_s: SCATTERING_TEXTURE_MU_S_SIZE,
            nu: SCATTERING_TEXTURE_NU_SIZE,
        }
    }
}

impl ScatteringTextureSize {
    pub fn width(&self) -> u32 {
        self.nu * self.mu_s
    }

    pub fn height(&self) -> u32 {
        self.mu
    }

    pub fn depth(&self) -> u32 {
        self.r
    }

    pub fn extent(&self) -> Vector3<u32> {
        Vector3::new(self.width(), self.height(), self.depth())
    }

    pub fn validate(&self) -> Result<(), AtmosphereError> {
        check_size("scattering r", self.r, 2)?;
        check_size("scattering mu", self.mu, 4)?;
        check_size("scattering mu_s", self.mu_s, 2)?;
        check_size("scattering nu", self.nu, 2)?;
        if self.mu % 2 != 0 {
            return Err(AtmosphereError::OddMuSize(self.mu));
        }
        check_texel_count("scattering", &[self.nu, self.mu_s, self.mu, self.r])
    }
}

// Texels are addressed with u32 voxel coordinates and flat indices.
fn check_texel_count(name: &'static str, dimensions: &[u32]) -> Result<(), AtmosphereError> {
    dimensions
        .iter()
        .try_fold(1u32, |count, &size| count.checked_mul(size))
        .map(|_| ())
        .ok_or_else(|| AtmosphereError::TextureTooLarge {
            name,
            dimensions: dimensions.to_vec(),
        })
}

fn check_size(name: &'static str, size: u32, min: u32) -> Result<(), AtmosphereError> {
    if size < min {
        return Err(AtmosphereError::TextureTooSmall { name, size, min });
    }
    Ok(())
}

/// Physical parameters of a view ray: the distance `r` of the viewer from
/// the planet center, and the cosines of the view zenith angle (`mu`), the
/// sun zenith angle (`mu_s`) and the view-sun angle (`nu`).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScatterCoord {
    pub r: f64,
    pub mu: f64,
    pub mu_s: f64,
    pub nu: f64,
}

// Texel centers of a texture of `size` texels sit at [0.5/size, 1 - 0.5/size];
// these map [0, 1] onto and off of that range.
#[inline]
pub fn texture_coord_from_unit_range(x: f64, texture_size: u32) -> f64 {
    let size = f64::from(texture_size);
    0.5 / size + x * (1.0 - 1.0 / size)
}

#[inline]
pub fn unit_range_from_texture_coord(u: f64, texture_size: u32) -> f64 {
    let size = f64::from(texture_size);
    (u - 0.5 / size) / (1.0 - 1.0 / size)
}

// Distance from the ground to the top of the atmosphere along a ray tangent
// to the ground.
fn horizon_distance(atmosphere: &AtmosphereParameters) -> f64 {
    (atmosphere.top_radius * atmosphere.top_radius
        - atmosphere.bottom_radius * atmosphere.bottom_radius)
        .sqrt()
}

pub fn transmittance_uv_from_r_mu(
    atmosphere: &AtmosphereParameters,
    size: &TransmittanceTextureSize,
    r: f64,
    mu: f64,
) -> Vector2<f64> {
    let h = horizon_distance(atmosphere);
    // Distance to the horizon.
    let rho = safe_sqrt(r * r - atmosphere.bottom_radius * atmosphere.bottom_radius);
    // Distance to the top atmosphere boundary for the ray (r,mu), and its
    // minimum and maximum values over all mu.
    let d = distance_to_top_atmosphere_boundary(atmosphere, r, mu);
    let d_min = atmosphere.top_radius - r;
    let d_max = rho + h;
    let x_mu = (d - d_min) / (d_max - d_min);
    let x_r = rho / h;
    Vector2::new(
        texture_coord_from_unit_range(x_mu, size.width),
        texture_coord_from_unit_range(x_r, size.height),
    )
}

pub fn r_mu_from_transmittance_uv(
    atmosphere: &AtmosphereParameters,
    size: &TransmittanceTextureSize,
    uv: Vector2<f64>,
) -> (f64, f64) {
    let x_mu = unit_range_from_texture_coord(uv.x, size.width);
    let x_r = unit_range_from_texture_coord(uv.y, size.height);
    let h = horizon_distance(atmosphere);
    let rho = h * x_r;
    let r = clamp_radius(
        atmosphere,
        (rho * rho + atmosphere.bottom_radius * atmosphere.bottom_radius).sqrt(),
    );
    let d_min = atmosphere.top_radius - r;
    let d_max = rho + h;
    let d = d_min + x_mu * (d_max - d_min);
    let mu = if d == 0.0 {
        1.0
    } else {
        (h * h - rho * rho - d * d) / (2.0 * r * d)
    };
    (r, clamp_cosine(mu))
}

/// The inverse of the coordinate mapper: the normalized (nu, mu_s, mu, r)
/// texture coordinates at which the given ray is stored.
pub fn scattering_uvwz_from_coord(
    atmosphere: &AtmosphereParameters,
    size: &ScatteringTextureSize,
    coord: &ScatterCoord,
    ray_r_mu_intersects_ground: bool,
) -> Vector4<f64> {
    let ScatterCoord { r, mu, mu_s, nu } = *coord;
    let bottom = atmosphere.bottom_radius;
    let top = atmosphere.top_radius;
    let h = horizon_distance(atmosphere);
    let rho = safe_sqrt(r * r - bottom * bottom);
    let u_r = texture_coord_from_unit_range(rho / h, size.r);

    // Discriminant of the quadratic equation for the intersections of the
    // ray (r,mu) with the ground.
    let r_mu = r * mu;
    let discriminant = r_mu * r_mu - r * r + bottom * bottom;
    let half_mu = size.mu / 2;
    let u_mu = if ray_r_mu_intersects_ground {
        // Distance to the ground, and its extremes over the rays that hit it.
        let d = -r_mu - safe_sqrt(discriminant);
        let d_min = r - bottom;
        let d_max = rho;
        let x = if d_max == d_min {
            0.0
        } else {
            (d - d_min) / (d_max - d_min)
        };
        0.5 - 0.5 * texture_coord_from_unit_range(x, half_mu)
    } else {
        // Distance to the top atmosphere boundary, and its extremes over the
        // rays that miss the ground.
        let d = -r_mu + safe_sqrt(discriminant + h * h);
        let d_min = top - r;
        let d_max = rho + h;
        0.5 + 0.5 * texture_coord_from_unit_range((d - d_min) / (d_max - d_min), half_mu)
    };

    let d = distance_to_top_atmosphere_boundary(atmosphere, bottom, mu_s);
    let d_min = top - bottom;
    let d_max = h;
    let a = (d - d_min) / (d_max - d_min);
    let big_d = distance_to_top_atmosphere_boundary(atmosphere, bottom, atmosphere.mu_s_min);
    let big_a = (big_d - d_min) / (d_max - d_min);
    // An ad-hoc function equal to 0 for mu_s = mu_s_min (because then d = D
    // and thus a = A), equal to 1 for mu_s = 1 (because then d = d_min and
    // thus a = 0), and with a large slope around mu_s = 0, to get more
    // texture samples near the horizon.
    let u_mu_s = texture_coord_from_unit_range((1.0 - a / big_a).max(0.0) / (1.0 + a), size.mu_s);

    let u_nu = (nu + 1.0) / 2.0;
    Vector4::new(u_nu, u_mu_s, u_mu, u_r)
}

fn coord_from_scattering_uvwz(
    atmosphere: &AtmosphereParameters,
    size: &ScatteringTextureSize,
    uvwz: Vector4<f64>,
) -> (ScatterCoord, bool) {
    let bottom = atmosphere.bottom_radius;
    let top = atmosphere.top_radius;
    let h = horizon_distance(atmosphere);
    let rho = h * unit_range_from_texture_coord(uvwz.w, size.r);
    let r = clamp_radius(atmosphere, (rho * rho + bottom * bottom).sqrt());

    let half_mu = size.mu / 2;
    let (mu, ray_r_mu_intersects_ground) = if uvwz.z < 0.5 {
        // Distance to the ground, mapped from the lower half of the texture.
        let d_min = r - bottom;
        let d_max = rho;
        let d = d_min
            + (d_max - d_min) * unit_range_from_texture_coord(1.0 - 2.0 * uvwz.z, half_mu);
        let mu = if d == 0.0 {
            -1.0
        } else {
            clamp_cosine(-(rho * rho + d * d) / (2.0 * r * d))
        };
        (mu, true)
    } else {
        // Distance to the top atmosphere boundary, from the upper half.
        let d_min = top - r;
        let d_max = rho + h;
        let d = d_min
            + (d_max - d_min) * unit_range_from_texture_coord(2.0 * uvwz.z - 1.0, half_mu);
        let mu = if d == 0.0 {
            1.0
        } else {
            clamp_cosine((h * h - rho * rho - d * d) / (2.0 * r * d))
        };
        (mu, false)
    };

    let x_mu_s = unit_range_from_texture_coord(uvwz.y, size.mu_s);
    let d_min = top - bottom;
    let d_max = h;
    let big_d = distance_to_top_atmosphere_boundary(atmosphere, bottom, atmosphere.mu_s_min);
    let big_a = (big_d - d_min) / (d_max - d_min);
    let a = (big_a - x_mu_s * big_a) / (1.0 + x_mu_s * big_a);
    let d = d_min + a.min(big_a) * (d_max - d_min);
    let mu_s = if d == 0.0 {
        1.0
    } else {
        clamp_cosine((h * h - d * d) / (2.0 * bottom * d))
    };

    let nu = clamp_cosine(uvwz.x * 2.0 - 1.0);
    (
        ScatterCoord { r, mu, mu_s, nu },
        ray_r_mu_intersects_ground,
    )
}

/// The coordinate mapper: the physical ray parameters stored at `voxel` of
/// a scattering texture of `size`, and whether that ray hits the ground.
pub fn scatter_coord_from_voxel(
    atmosphere: &AtmosphereParameters,
    size: &ScatteringTextureSize,
    voxel: Vector3<u32>,
) -> (ScatterCoord, bool) {
    let frag_coord = voxel.map(f64::from) + Vector3::repeat(0.5);
    let mu_s_size = f64::from(size.mu_s);
    let frag_coord_nu = (frag_coord.x / mu_s_size).floor();
    let frag_coord_mu_s = frag_coord.x % mu_s_size;
    let uvwz = Vector4::new(
        frag_coord_nu / f64::from(size.nu - 1),
        frag_coord_mu_s / mu_s_size,
        frag_coord.y / f64::from(size.mu),
        frag_coord.z / f64::from(size.r),
    );
    let (mut coord, ray_r_mu_intersects_ground) =
        coord_from_scattering_uvwz(atmosphere, size, uvwz);

    // Clamp nu to its valid range of values, given mu and mu_s.
    let spread = ((1.0 - coord.mu * coord.mu) * (1.0 - coord.mu_s * coord.mu_s)).sqrt();
    coord.nu = coord
        .nu
        .clamp(coord.mu * coord.mu_s - spread, coord.mu * coord.mu_s + spread);
    (coord, ray_r_mu_intersects_ground)
}
