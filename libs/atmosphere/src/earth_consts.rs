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
    colorspace::{
        cie_color_coefficient_at_wavelength, convert_xyz_to_srgb, MAX_LAMBDA,
        MAX_LUMINOUS_EFFICACY, MIN_LAMBDA,
    },
    error::AtmosphereError,
};
use nalgebra::{Vector3, Vector4};
use std::f64::consts::{FRAC_PI_2, PI};

pub const RGB_LAMBDAS: [f64; 4] = [680.0, 550.0, 440.0, 0.0];

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DensityProfileLayer {
    // Height of this layer, except for the last layer which always
    // extends to the top of the atmosphere region.
    pub width: f64, // km

    // Density in this layer in [0,1) as defined by the following function:
    //   'exp_term' * exp('exp_scale' * h) + 'linear_term' * h + 'constant_term',
    pub exp_term: f64,
    pub exp_scale: f64,   // 1 / km
    pub linear_term: f64, // 1 / km
    pub constant_term: f64,
}

impl DensityProfileLayer {
    pub fn exponential(scale_height: f64) -> Self {
        Self {
            exp_term: 1.0,
            exp_scale: -1.0 / scale_height,
            ..Default::default()
        }
    }

    pub fn constant(density: f64) -> Self {
        Self {
            constant_term: density,
            ..Default::default()
        }
    }

    pub fn density(&self, altitude: f64) -> f64 {
        let density = self.exp_term * (self.exp_scale * altitude).exp()
            + self.linear_term * altitude
            + self.constant_term;
        density.clamp(0.0, 1.0)
    }
}

// From low to high.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DensityProfile {
    pub layers: [DensityProfileLayer; 2],
}

impl DensityProfile {
    pub fn single(layer: DensityProfileLayer) -> Self {
        Self {
            layers: [Default::default(), layer],
        }
    }

    pub fn density(&self, altitude: f64) -> f64 {
        if altitude < self.layers[0].width {
            self.layers[0].density(altitude)
        } else {
            self.layers[1].density(altitude)
        }
    }
}

/// The physical description of an atmosphere, sampled at four wavelengths.
/// Lengths are in km.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AtmosphereParameters {
    // The density profile of tiny air molecules.
    pub rayleigh_density: DensityProfile,

    // The density profile of aerosols.
    pub mie_density: DensityProfile,

    // The density profile of O3.
    pub absorption_density: DensityProfile,

    // Per component, at max density.
    pub rayleigh_scattering_coefficient: Vector4<f64>,

    // Per component, at max density.
    pub mie_scattering_coefficient: Vector4<f64>,

    // Per component, at max density.
    pub mie_extinction_coefficient: Vector4<f64>,

    // Per component, at max density.
    pub absorption_extinction_coefficient: Vector4<f64>,

    // Energy received into the system from the nearby star.
    pub sun_irradiance: Vector4<f64>,

    // The whitepoint, given the relative contributions of all possible wavelengths.
    pub whitepoint: Vector3<f64>,

    // Conversion between the solar irradiance above and our desired sRGB luminance output.
    pub sun_spectral_radiance_to_luminance: Vector3<f64>,

    // Conversion between the irradiance stored in our LUT and sRGB luminance outputs.
    // Note that this is where we re-add the luminous efficacy constant that we factored
    // out of the precomputations to keep the numbers closer to 0 for precision.
    pub sky_spectral_radiance_to_luminance: Vector3<f64>,

    // From center to subocean.
    pub bottom_radius: f64,

    // from center to top of simulated atmosphere.
    pub top_radius: f64,

    // The size of the nearby star in radians.
    pub sun_angular_radius: f64,

    // The asymmetry parameter for the Cornette-Shanks phase function for the
    // aerosols.
    pub mie_phase_function_g: f64,

    // The cosine of the maximum Sun zenith angle for which atmospheric scattering
    // must be precomputed (for maximum precision, use the smallest Sun zenith
    // angle yielding negligible sky light radiance values. For instance, for the
    // Earth case, 102 degrees is a good choice - yielding mu_s_min = -0.2).
    pub mu_s_min: f64,
}

impl AtmosphereParameters {
    pub fn validate(&self) -> Result<(), AtmosphereError> {
        if !(self.bottom_radius > 0.0 && self.bottom_radius < self.top_radius) {
            return Err(AtmosphereError::InvalidRadii {
                bottom: self.bottom_radius,
                top: self.top_radius,
            });
        }
        let coefficients = [
            ("rayleigh scattering", &self.rayleigh_scattering_coefficient),
            ("mie scattering", &self.mie_scattering_coefficient),
            ("mie extinction", &self.mie_extinction_coefficient),
            ("absorption extinction", &self.absorption_extinction_coefficient),
            ("sun irradiance", &self.sun_irradiance),
        ];
        for (name, coefficient) in coefficients {
            if let Some(&value) = coefficient.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
                return Err(AtmosphereError::NegativeCoefficient { name, value });
            }
        }
        let profiles = [
            ("rayleigh", &self.rayleigh_density),
            ("mie", &self.mie_density),
            ("absorption", &self.absorption_density),
        ];
        for (name, profile) in profiles {
            for layer in &profile.layers {
                if layer.width < 0.0 {
                    return Err(AtmosphereError::NegativeLayerWidth {
                        name,
                        width: layer.width,
                    });
                }
            }
        }
        if !(self.sun_angular_radius > 0.0 && self.sun_angular_radius < FRAC_PI_2) {
            return Err(AtmosphereError::InvalidSunAngularRadius(
                self.sun_angular_radius,
            ));
        }
        if !(-1.0..1.0).contains(&self.mu_s_min) {
            return Err(AtmosphereError::InvalidMuSMin(self.mu_s_min));
        }
        Ok(())
    }
}

// Evaluate the wavelength-based table at the given wavelength,
// interpolating between adjacent table values.
fn interpolate_at_lambda(wavelengths: &[f64], properties: &[f64], wavelength: f64) -> f64 {
    debug_assert_eq!(properties.len(), wavelengths.len());
    if wavelength < wavelengths[0] {
        return properties[0];
    }
    for (wl, props) in wavelengths.windows(2).zip(properties.windows(2)) {
        if wavelength < wl[1] {
            let f = (wavelength - wl[0]) / (wl[1] - wl[0]);
            return props[0] * (1.0 - f) + props[1] * f;
        }
    }
    properties[properties.len() - 1]
}

fn interpolate(
    wavelengths: &[f64],
    properties: &[f64],
    lambdas: [f64; 4],
    scale: f64,
) -> Vector4<f64> {
    Vector4::from_fn(|i, _| interpolate_at_lambda(wavelengths, properties, lambdas[i]) * scale)
}

// Values from "Reference Solar Spectral Irradiance: ASTM G-173", ETR column
// (see http://rredc.nrel.gov/solar/spectra/am1.5/ASTMG173/ASTMG173.html),
// summed and averaged in each bin (e.g. the value for 360nm is the average
// of the ASTM G-173 values for all wavelengths between 360 and 370nm).
// Values in W.m^-2.
const LAMBDA_STEP: usize = 10;
const SOLAR_IRRADIANCE: [f64; 48] = [
    1.11776, 1.14259, 1.01249, 1.14716, 1.72765, 1.73054, 1.6887, 1.61253, 1.91198, 2.03474,
    2.02042, 2.02212, 1.93377, 1.95809, 1.91686, 1.8298, 1.8685, 1.8931, 1.85149, 1.8504, 1.8341,
    1.8345, 1.8147, 1.78158, 1.7533, 1.6965, 1.68194, 1.64654, 1.6048, 1.52143, 1.55622, 1.5113,
    1.474, 1.4482, 1.41018, 1.36775, 1.34188, 1.31429, 1.28303, 1.26758, 1.2367, 1.2082, 1.18737,
    1.14683, 1.12362, 1.1058, 1.07124, 1.04992,
];
// Values from http://www.iup.uni-bremen.de/gruppen/molspec/databases/
// referencespectra/o3spectra2011/index.html for 233K, summed and averaged in
// each bin (e.g. the value for 360nm is the average of the original values
// for all wavelengths between 360 and 370nm). Values in m^2.
const OZONE_CROSS_SECTION: [f64; 48] = [
    1.18e-27, 2.182e-28, 2.818e-28, 6.636e-28, 1.527e-27, 2.763e-27, 5.52e-27, 8.451e-27,
    1.582e-26, 2.316e-26, 3.669e-26, 4.924e-26, 7.752e-26, 9.016e-26, 1.48e-25, 1.602e-25,
    2.139e-25, 2.755e-25, 3.091e-25, 3.5e-25, 4.266e-25, 4.672e-25, 4.398e-25, 4.701e-25,
    5.019e-25, 4.305e-25, 3.74e-25, 3.215e-25, 2.662e-25, 2.238e-25, 1.852e-25, 1.473e-25,
    1.209e-25, 9.423e-26, 7.455e-26, 6.566e-26, 5.105e-26, 4.15e-26, 4.228e-26, 3.237e-26,
    2.451e-26, 2.801e-26, 2.534e-26, 1.624e-26, 1.465e-26, 2.078e-26, 1.383e-26, 7.105e-27,
];
// From https://en.wikipedia.org/wiki/Dobson_unit, in molecules.m^-2.
const DOBSON_UNIT: f64 = 2.687e20;
// Maximum number density of ozone molecules, in m^-3 (computed so at to get
// 300 Dobson units of ozone - for this we divide 300 DU by the integral of
// the ozone density profile defined below, which is equal to 15km).
const MAX_OZONE_NUMBER_DENSITY: f64 = 300.0 * DOBSON_UNIT / 15_000.0;
const RAYLEIGH_SCATTER_COEFFICIENT: f64 = 1.24062e-6;
const RAYLEIGH_SCALE_HEIGHT: f64 = 8000.0;
const MIE_SCALE_HEIGHT: f64 = 1200.0;
const MIE_ANGSTROM_ALPHA: f64 = 0.0;
const MIE_ANGSTROM_BETA: f64 = 5.328e-3;
const MIE_SINGLE_SCATTERING_ALBEDO: f64 = 0.9;
const MIE_PHASE_FUNCTION_G: f64 = 0.8;
const MAX_SUN_ZENITH_ANGLE: f64 = 120.0 / 180.0 * PI;
const SUN_ANGULAR_RADIUS: f64 = 0.00935 / 2.0;
const EARTH_BOTTOM_RADIUS: f64 = 6_360_000.0;
const EARTH_TOP_RADIUS: f64 = 6_420_000.0;

// Tables are built in meters; the atmosphere itself is described in km.
const LENGTH_SCALE: f64 = 1000.0;

/// Spectral description of Earth's atmosphere, tabulated every 10nm across
/// the visible range.
pub struct EarthParameters {
    wavelengths: Vec<f64>,
    sun_irradiance: Vec<f64>,
    rayleigh_scattering: Vec<f64>,
    mie_scattering: Vec<f64>,
    mie_extinction: Vec<f64>,
    absorption_extinction: Vec<f64>,
    sun_spectral_radiance_to_luminance: Vector3<f64>,
    whitepoint: Vector3<f64>,
}

impl Default for EarthParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl EarthParameters {
    pub fn new() -> Self {
        // Expand all of our parameters that are consistent across all
        // wavelengths to the same dimensionality as the measured tables.
        let mut wavelengths = Vec::new();
        let mut sun_irradiance = Vec::new();
        let mut rayleigh_scattering = Vec::new();
        let mut mie_scattering = Vec::new();
        let mut mie_extinction = Vec::new();
        let mut absorption_extinction = Vec::new();
        for ((l, sun_irr), ozone_cross_sec) in (MIN_LAMBDA as usize..=MAX_LAMBDA as usize)
            .step_by(LAMBDA_STEP)
            .zip(SOLAR_IRRADIANCE.iter())
            .zip(OZONE_CROSS_SECTION.iter())
        {
            let lf = l as f64;
            wavelengths.push(lf);
            sun_irradiance.push(*sun_irr);
            let lambda = lf / 1000.0; // um
            rayleigh_scattering.push(RAYLEIGH_SCATTER_COEFFICIENT * lambda.powf(-4.0));
            let mie = MIE_ANGSTROM_BETA / MIE_SCALE_HEIGHT * lambda.powf(-MIE_ANGSTROM_ALPHA);
            mie_scattering.push(mie * MIE_SINGLE_SCATTERING_ALBEDO);
            mie_extinction.push(mie);
            absorption_extinction.push(MAX_OZONE_NUMBER_DENSITY * ozone_cross_sec);
        }
        let sun_spectral_radiance_to_luminance =
            Self::compute_spectral_radiance_to_luminance_factors(
                &wavelengths,
                &sun_irradiance,
                0.0,
            );
        let srgb = Self::compute_solar_irradiance_to_linear_srgb(&wavelengths, &sun_irradiance);
        let avg = (srgb[0] + srgb[1] + srgb[2]) / 3.0;
        let whitepoint = Vector3::new(srgb[0] / avg, srgb[1] / avg, srgb[2] / avg);

        Self {
            wavelengths,
            sun_irradiance,
            rayleigh_scattering,
            mie_scattering,
            mie_extinction,
            absorption_extinction,
            sun_spectral_radiance_to_luminance,
            whitepoint,
        }
    }

    // The returned constants are in lumen.nm / watt.
    fn compute_spectral_radiance_to_luminance_factors(
        wavelengths: &[f64],
        sun_irradiance: &[f64],
        lambda_power: f64,
    ) -> Vector3<f64> {
        let mut out = Vector3::zeros();
        let solar = interpolate(wavelengths, sun_irradiance, RGB_LAMBDAS, 1.0);
        for lambda in MIN_LAMBDA as usize..MAX_LAMBDA as usize {
            let f_lambda = lambda as f64;
            let xyz_bar = cie_color_coefficient_at_wavelength(f_lambda);
            let rgb_bar = convert_xyz_to_srgb(xyz_bar, 1.0);
            let irradiance = interpolate_at_lambda(wavelengths, sun_irradiance, f_lambda);
            for i in 0..3 {
                out[i] += rgb_bar[i] * irradiance / solar[i]
                    * (f_lambda / RGB_LAMBDAS[i]).powf(lambda_power);
            }
        }
        out * MAX_LUMINOUS_EFFICACY
    }

    pub fn compute_solar_irradiance_to_linear_srgb(
        wavelengths: &[f64],
        sun_irradiance: &[f64],
    ) -> [f64; 3] {
        let mut xyz = [0f64; 3];
        for lambda in MIN_LAMBDA as usize..MAX_LAMBDA as usize {
            let f_lambda = lambda as f64;
            let value = interpolate_at_lambda(wavelengths, sun_irradiance, f_lambda);
            let bar = cie_color_coefficient_at_wavelength(f_lambda);
            for (acc, b) in xyz.iter_mut().zip(bar.iter()) {
                *acc += b * value;
            }
        }
        convert_xyz_to_srgb(xyz, MAX_LUMINOUS_EFFICACY)
    }

    /// Evaluate our physical model at the given four wavelengths.
    pub fn sample(&self, lambdas: [f64; 4]) -> AtmosphereParameters {
        AtmosphereParameters {
            sun_irradiance: interpolate(&self.wavelengths, &self.sun_irradiance, lambdas, 1.0),
            sun_angular_radius: SUN_ANGULAR_RADIUS,
            sun_spectral_radiance_to_luminance: self.sun_spectral_radiance_to_luminance,
            sky_spectral_radiance_to_luminance: Vector3::repeat(MAX_LUMINOUS_EFFICACY),
            bottom_radius: EARTH_BOTTOM_RADIUS / LENGTH_SCALE,
            top_radius: EARTH_TOP_RADIUS / LENGTH_SCALE,
            rayleigh_density: DensityProfile::single(DensityProfileLayer::exponential(
                RAYLEIGH_SCALE_HEIGHT / LENGTH_SCALE,
            )),
            rayleigh_scattering_coefficient: interpolate(
                &self.wavelengths,
                &self.rayleigh_scattering,
                lambdas,
                LENGTH_SCALE,
            ),
            mie_density: DensityProfile::single(DensityProfileLayer::exponential(
                MIE_SCALE_HEIGHT / LENGTH_SCALE,
            )),
            mie_scattering_coefficient: interpolate(
                &self.wavelengths,
                &self.mie_scattering,
                lambdas,
                LENGTH_SCALE,
            ),
            mie_extinction_coefficient: interpolate(
                &self.wavelengths,
                &self.mie_extinction,
                lambdas,
                LENGTH_SCALE,
            ),
            mie_phase_function_g: MIE_PHASE_FUNCTION_G,
            // Ozone is a tent function peaking at 25km, 15km wide on either side.
            absorption_density: DensityProfile {
                layers: [
                    DensityProfileLayer {
                        width: 25_000.0 / LENGTH_SCALE,
                        linear_term: 1.0 / 15_000.0 * LENGTH_SCALE,
                        constant_term: -2.0 / 3.0,
                        ..Default::default()
                    },
                    DensityProfileLayer {
                        linear_term: -1.0 / 15_000.0 * LENGTH_SCALE,
                        constant_term: 8.0 / 3.0,
                        ..Default::default()
                    },
                ],
            },
            absorption_extinction_coefficient: interpolate(
                &self.wavelengths,
                &self.absorption_extinction,
                lambdas,
                LENGTH_SCALE,
            ),
            whitepoint: self.whitepoint,
            mu_s_min: MAX_SUN_ZENITH_ANGLE.cos(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use approx::assert_relative_eq;

    #[test]
    fn test_earth_is_valid() -> Result<()> {
        let atmosphere = EarthParameters::new().sample(RGB_LAMBDAS);
        atmosphere.validate()?;
        assert_relative_eq!(atmosphere.bottom_radius, 6360.0);
        assert_relative_eq!(atmosphere.top_radius, 6420.0);
        assert_relative_eq!(atmosphere.mu_s_min, -0.5, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_rayleigh_is_bluer() {
        let atmosphere = EarthParameters::new().sample(RGB_LAMBDAS);
        let beta = atmosphere.rayleigh_scattering_coefficient;
        assert!(beta[0] < beta[1]);
        assert!(beta[1] < beta[2]);
        // ~5.8e-3 / km in the red, per Bruneton.
        assert_relative_eq!(beta[0], 5.8e-3, max_relative = 0.05);
    }

    #[test]
    fn test_whitepoint_is_normalized() {
        let atmosphere = EarthParameters::new().sample(RGB_LAMBDAS);
        assert_relative_eq!(atmosphere.whitepoint.sum(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ozone_profile_peaks_at_25km() {
        let atmosphere = EarthParameters::new().sample(RGB_LAMBDAS);
        let ozone = &atmosphere.absorption_density;
        assert_relative_eq!(ozone.density(25.0), 1.0, epsilon = 1e-9);
        assert_relative_eq!(ozone.density(10.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(ozone.density(40.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(ozone.density(17.5), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_exponential_layer() {
        let layer = DensityProfileLayer::exponential(8.0);
        assert_relative_eq!(layer.density(0.0), 1.0);
        assert_relative_eq!(layer.density(8.0), (-1f64).exp());
        // Density never leaves [0, 1].
        assert_relative_eq!(layer.density(-8.0), 1.0);
    }

    #[test]
    fn test_validate_rejects_inverted_radii() {
        let mut atmosphere = EarthParameters::new().sample(RGB_LAMBDAS);
        atmosphere.top_radius = atmosphere.bottom_radius;
        assert_eq!(
            atmosphere.validate(),
            Err(AtmosphereError::InvalidRadii {
                bottom: 6360.0,
                top: 6360.0
            })
        );
    }

    #[test]
    fn test_validate_rejects_negative_coefficients() {
        let mut atmosphere = EarthParameters::new().sample(RGB_LAMBDAS);
        atmosphere.mie_scattering_coefficient[2] = -1.0;
        assert!(matches!(
            atmosphere.validate(),
            Err(AtmosphereError::NegativeCoefficient {
                name: "mie scattering",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_sun() {
        let mut atmosphere = EarthParameters::new().sample(RGB_LAMBDAS);
        atmosphere.sun_angular_radius = 0.0;
        assert!(atmosphere.validate().is_err());
    }
}
