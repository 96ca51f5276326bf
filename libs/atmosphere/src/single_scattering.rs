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

// Single scattering: sunlight that reaches the viewer after exactly one
// scattering event along the view ray. The phase functions are not applied
// here; they are cheap to evaluate at render time and applying them later
// keeps the angular resolution of the table where it is needed.
use crate::{
    earth_consts::AtmosphereParameters,
    geometry::{
        clamp_cosine, clamp_radius, distance_to_nearest_atmosphere_boundary, radius_along_ray,
    },
    table_helpers::{scatter_coord_from_voxel, ScatterCoord, ScatteringTextureSize},
    texture::TexelStore,
    transmittance::{get_transmittance, get_transmittance_to_sun, TransmittanceLookup},
};
use nalgebra::{Matrix4, Vector3, Vector4};

/// Number of trapezoids along each view ray.
pub const SINGLE_SCATTERING_SAMPLE_COUNT: usize = 50;

/// The Rayleigh and Mie contributions, before the scattering coefficients
/// and sun irradiance are applied, of the point at distance `d` along the
/// view ray.
pub fn compute_single_scattering_integrand(
    atmosphere: &AtmosphereParameters,
    transmittance: &impl TransmittanceLookup,
    coord: &ScatterCoord,
    d: f64,
    ray_r_mu_intersects_ground: bool,
) -> (Vector4<f64>, Vector4<f64>) {
    let ScatterCoord { r, mu, mu_s, nu } = *coord;
    let r_d = clamp_radius(atmosphere, radius_along_ray(r, mu, d));
    let mu_s_d = clamp_cosine((r * mu_s + d * nu) / r_d);
    let attenuation = get_transmittance(
        atmosphere,
        transmittance,
        r,
        mu,
        d,
        ray_r_mu_intersects_ground,
    )
    .component_mul(&get_transmittance_to_sun(
        atmosphere,
        transmittance,
        r_d,
        mu_s_d,
    ));
    let altitude = r_d - atmosphere.bottom_radius;
    let rayleigh = attenuation * atmosphere.rayleigh_density.density(altitude);
    let mie = attenuation * atmosphere.mie_density.density(altitude);
    (rayleigh, mie)
}

/// Integrate single scattering along the view ray, from the viewer to the
/// nearest atmosphere boundary, with the trapezoidal rule over
/// `sample_count` intervals.
pub fn compute_single_scattering(
    atmosphere: &AtmosphereParameters,
    transmittance: &impl TransmittanceLookup,
    coord: &ScatterCoord,
    ray_r_mu_intersects_ground: bool,
    sample_count: usize,
) -> (Vector4<f64>, Vector4<f64>) {
    debug_assert!(
        coord.r >= atmosphere.bottom_radius && coord.r <= atmosphere.top_radius,
        "r out of range: {:?}",
        coord
    );
    debug_assert!((-1.0..=1.0).contains(&coord.mu));
    debug_assert!((-1.0..=1.0).contains(&coord.mu_s));
    debug_assert!((-1.0..=1.0).contains(&coord.nu));

    if sample_count == 0 {
        return (Vector4::zeros(), Vector4::zeros());
    }

    let dx = distance_to_nearest_atmosphere_boundary(
        atmosphere,
        coord.r,
        coord.mu,
        ray_r_mu_intersects_ground,
    ) / sample_count as f64;
    let mut rayleigh_sum = Vector4::zeros();
    let mut mie_sum = Vector4::zeros();
    for i in 0..=sample_count {
        let d_i = i as f64 * dx;
        let (rayleigh_i, mie_i) = compute_single_scattering_integrand(
            atmosphere,
            transmittance,
            coord,
            d_i,
            ray_r_mu_intersects_ground,
        );
        let weight_i = if i == 0 || i == sample_count { 0.5 } else { 1.0 };
        rayleigh_sum += rayleigh_i * weight_i;
        mie_sum += mie_i * weight_i;
    }
    let rayleigh = (rayleigh_sum * dx)
        .component_mul(&atmosphere.sun_irradiance)
        .component_mul(&atmosphere.rayleigh_scattering_coefficient);
    let mie = (mie_sum * dx)
        .component_mul(&atmosphere.sun_irradiance)
        .component_mul(&atmosphere.mie_scattering_coefficient);
    (rayleigh, mie)
}

/// Compute one voxel of the single scattering tables. The raw Rayleigh and
/// Mie values are written to `delta_rayleigh` and `delta_mie`; the returned
/// pair is the same values converted to luminance, for accumulation.
#[allow(clippy::too_many_arguments)]
pub fn compute_single_scattering_texel(
    voxel: Vector3<u32>,
    size: &ScatteringTextureSize,
    rad_to_lum: &Matrix4<f64>,
    atmosphere: &AtmosphereParameters,
    transmittance: &impl TransmittanceLookup,
    delta_rayleigh: &mut impl TexelStore,
    delta_mie: &mut impl TexelStore,
    sample_count: usize,
) -> (Vector3<f64>, Vector3<f64>) {
    let (coord, ray_r_mu_intersects_ground) = scatter_coord_from_voxel(atmosphere, size, voxel);
    let (rayleigh, mie) = compute_single_scattering(
        atmosphere,
        transmittance,
        &coord,
        ray_r_mu_intersects_ground,
        sample_count,
    );
    delta_rayleigh.store(voxel, rayleigh);
    delta_mie.store(voxel, mie);
    let scattering = rad_to_lum * rayleigh;
    let single_mie_scattering = rad_to_lum * mie;
    (scattering.xyz(), single_mie_scattering.xyz())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        earth_consts::{DensityProfile, DensityProfileLayer},
        geometry::tests::test_atmosphere,
        table_helpers::TransmittanceTextureSize,
        texture::Texture3d,
        transmittance::{tests::UnitTransmittance, TransmittanceTable},
    };
    use approx::assert_relative_eq;

    fn small_size() -> ScatteringTextureSize {
        ScatteringTextureSize {
            r: 4,
            mu: 8,
            mu_s: 4,
            nu: 2,
        }
    }

    fn small_table(atmosphere: &AtmosphereParameters) -> TransmittanceTable {
        TransmittanceTable::build(
            atmosphere,
            TransmittanceTextureSize {
                width: 64,
                height: 16,
            },
        )
    }

    fn straight_up(r: f64) -> ScatterCoord {
        ScatterCoord {
            r,
            mu: 1.0,
            mu_s: 1.0,
            nu: 1.0,
        }
    }

    #[test]
    fn test_integrand_is_non_negative() {
        let atmosphere = test_atmosphere();
        let table = small_table(&atmosphere);
        let size = small_size();
        let extent = size.extent();
        for z in 0..extent.z {
            for y in 0..extent.y {
                for x in 0..extent.x {
                    let (coord, ground) =
                        scatter_coord_from_voxel(&atmosphere, &size, Vector3::new(x, y, z));
                    for &d in &[0.0, 1.0, 10.0, 50.0] {
                        let (rayleigh, mie) = compute_single_scattering_integrand(
                            &atmosphere,
                            &table,
                            &coord,
                            d,
                            ground,
                        );
                        assert!(rayleigh.iter().all(|&v| v >= 0.0 && v.is_finite()));
                        assert!(mie.iter().all(|&v| v >= 0.0 && v.is_finite()));
                    }
                }
            }
        }
    }

    #[test]
    fn test_converges_with_sample_count() {
        let mut atmosphere = test_atmosphere();
        atmosphere.sun_irradiance = Vector4::repeat(1.0);
        // Exact integral of exp(-h / 8) over the 60km column.
        let exact = 8.0 * (1.0 - (-60f64 / 8.0).exp());
        let mut last_error = f64::MAX;
        for &n in &[5, 10, 20, 50, 100, 200] {
            let (rayleigh, _) = compute_single_scattering(
                &atmosphere,
                &UnitTransmittance,
                &straight_up(6360.0),
                false,
                n,
            );
            let integral = rayleigh.x / atmosphere.rayleigh_scattering_coefficient.x;
            let error = (integral - exact).abs();
            assert!(error < last_error, "n={} error={} last={}", n, error, last_error);
            last_error = error;
        }
        assert!(last_error / exact < 1e-3);
    }

    #[test]
    fn test_empty_path_is_dark() {
        let atmosphere = test_atmosphere();
        let table = small_table(&atmosphere);
        let (rayleigh, mie) = compute_single_scattering(
            &atmosphere,
            &table,
            &straight_up(atmosphere.top_radius),
            false,
            SINGLE_SCATTERING_SAMPLE_COUNT,
        );
        assert_relative_eq!(rayleigh, Vector4::zeros());
        assert_relative_eq!(mie, Vector4::zeros());
    }

    #[test]
    fn test_zero_samples_is_dark() {
        let atmosphere = test_atmosphere();
        let (rayleigh, mie) = compute_single_scattering(
            &atmosphere,
            &UnitTransmittance,
            &straight_up(6360.0),
            false,
            0,
        );
        assert_relative_eq!(rayleigh, Vector4::zeros());
        assert_relative_eq!(mie, Vector4::zeros());
    }

    #[test]
    fn test_empty_atmosphere_is_dark() {
        let mut atmosphere = test_atmosphere();
        atmosphere.rayleigh_density = DensityProfile::default();
        atmosphere.mie_density = DensityProfile::default();
        let table = small_table(&atmosphere);
        let size = small_size();
        let extent = size.extent();
        let mut delta_rayleigh = Texture3d::new(extent.x, extent.y, extent.z);
        let mut delta_mie = Texture3d::new(extent.x, extent.y, extent.z);
        // One voxel whose ray hits the ground and one that looks at the sky.
        for &voxel in &[
            Vector3::new(1, 0, extent.z - 1),
            Vector3::new(1, extent.y - 1, 1),
        ] {
            let (coord, ground) = scatter_coord_from_voxel(&atmosphere, &size, voxel);
            assert_eq!(ground, voxel.y == 0, "{:?}", coord);
            let (scattering, single_mie_scattering) = compute_single_scattering_texel(
                voxel,
                &size,
                &Matrix4::identity(),
                &atmosphere,
                &table,
                &mut delta_rayleigh,
                &mut delta_mie,
                SINGLE_SCATTERING_SAMPLE_COUNT,
            );
            assert_relative_eq!(scattering, Vector3::zeros());
            assert_relative_eq!(single_mie_scattering, Vector3::zeros());
        }
        assert_eq!(delta_rayleigh.range(), (0.0, 0.0));
        assert_eq!(delta_mie.range(), (0.0, 0.0));
    }

    #[test]
    fn test_sun_on_horizon_is_symmetric_at_viewer() {
        let atmosphere = test_atmosphere();
        let table = small_table(&atmosphere);
        let coord = ScatterCoord {
            r: 6370.0,
            mu: 0.5,
            mu_s: 0.0,
            nu: 0.3,
        };
        let mirrored = ScatterCoord { nu: -0.3, ..coord };
        let (rayleigh, mie) =
            compute_single_scattering_integrand(&atmosphere, &table, &coord, 0.0, false);
        let (mirrored_rayleigh, mirrored_mie) =
            compute_single_scattering_integrand(&atmosphere, &table, &mirrored, 0.0, false);
        assert_relative_eq!(rayleigh, mirrored_rayleigh);
        assert_relative_eq!(mie, mirrored_mie);
    }

    #[test]
    fn test_uniform_column_seen_from_ground() {
        let mut atmosphere = test_atmosphere();
        atmosphere.rayleigh_density = DensityProfile::single(DensityProfileLayer::constant(1.0));
        atmosphere.mie_density = DensityProfile::default();
        atmosphere.sun_irradiance = Vector4::repeat(1.0);
        let size = ScatteringTextureSize::default();
        let extent = size.extent();
        let mut delta_rayleigh = Texture3d::new(extent.x, extent.y, extent.z);
        let mut delta_mie = Texture3d::new(extent.x, extent.y, extent.z);

        // Looking straight up from the ground, with the sun overhead.
        let voxel = Vector3::new(2 * size.mu_s + size.mu_s - 1, size.mu / 2, 0);
        let rad_to_lum = Matrix4::identity() * 2.0;
        let (scattering, single_mie_scattering) = compute_single_scattering_texel(
            voxel,
            &size,
            &rad_to_lum,
            &atmosphere,
            &UnitTransmittance,
            &mut delta_rayleigh,
            &mut delta_mie,
            SINGLE_SCATTERING_SAMPLE_COUNT,
        );

        let expected = atmosphere.rayleigh_scattering_coefficient * 60.0;
        assert_relative_eq!(delta_rayleigh.get(voxel), expected, max_relative = 1e-5);
        assert_relative_eq!(delta_mie.get(voxel), Vector4::zeros());
        assert_relative_eq!(scattering, expected.xyz() * 2.0, max_relative = 1e-5);
        assert_relative_eq!(single_mie_scattering, Vector3::zeros());
    }
}
