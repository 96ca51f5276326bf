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
use nalgebra::Matrix4;

pub const MIN_LAMBDA: f64 = 360.0; // nm
pub const MAX_LAMBDA: f64 = 830.0; // nm

// lm / W
pub const MAX_LUMINOUS_EFFICACY: f64 = 683.0;

// Row major; the standard D65 conversion from CIE XYZ to linear sRGB.
const XYZ_TO_SRGB: [f64; 9] = [
    3.2406, -1.5372, -0.4986, //
    -0.9689, 1.8758, 0.0415, //
    0.0557, -0.2040, 1.0570,
];

// Piecewise gaussian with a different falloff on either side of the mean.
fn lobe(lambda: f64, mean: f64, sigma_lo: f64, sigma_hi: f64) -> f64 {
    let sigma = if lambda < mean { sigma_lo } else { sigma_hi };
    let t = (lambda - mean) / sigma;
    (-0.5 * t * t).exp()
}

/// The CIE 1931 2-degree color matching functions at `lambda` (nm).
///
/// Rather than carrying the full 5nm tabulation, we use the multi-lobe fit
/// from Wyman, Sloan and Shirley, "Simple Analytic Approximations to the
/// CIE XYZ Color Matching Functions" (JCGT 2013), which is well within the
/// precision we can store in the tables anyway.
pub fn cie_color_coefficient_at_wavelength(lambda: f64) -> [f64; 3] {
    if !(MIN_LAMBDA..=MAX_LAMBDA).contains(&lambda) {
        return [0f64; 3];
    }
    let x = 1.056 * lobe(lambda, 599.8, 37.9, 31.0) + 0.362 * lobe(lambda, 442.0, 16.0, 26.7)
        - 0.065 * lobe(lambda, 501.1, 20.4, 26.2);
    let y = 0.821 * lobe(lambda, 568.8, 46.9, 40.5) + 0.286 * lobe(lambda, 530.9, 16.3, 31.1);
    let z = 1.217 * lobe(lambda, 437.0, 11.8, 36.0) + 0.681 * lobe(lambda, 459.0, 26.0, 13.8);
    [x, y, z]
}

pub fn convert_xyz_to_srgb(xyz: [f64; 3], scale: f64) -> [f64; 3] {
    let mut out = [0f64; 3];
    for (i, o) in out.iter_mut().enumerate() {
        *o = scale
            * (XYZ_TO_SRGB[i * 3] * xyz[0]
                + XYZ_TO_SRGB[i * 3 + 1] * xyz[1]
                + XYZ_TO_SRGB[i * 3 + 2] * xyz[2]);
    }
    out
}

// Luminous efficacy is left out so that the tables stay close to 0 for
// precision. It gets re-applied by the sky radiance to luminance factor.
pub fn wavelength_to_srgb(lambda: f64, delta_lambda: f64) -> [f64; 3] {
    convert_xyz_to_srgb(cie_color_coefficient_at_wavelength(lambda), delta_lambda)
}

/// Build the radiance to luminance conversion for a group of four
/// wavelengths: each column holds the sRGB weights of one wavelength, and
/// the bottom row is zero so that the fourth output channel is unused.
pub fn rad_to_lum_for(lambdas: [f64; 4], delta_lambda: f64) -> Matrix4<f64> {
    let mut rad_to_lum = Matrix4::zeros();
    for (column, &lambda) in lambdas.iter().enumerate() {
        let rgb = wavelength_to_srgb(lambda, delta_lambda);
        for (row, v) in rgb.iter().enumerate() {
            rad_to_lum[(row, column)] = *v;
        }
    }
    rad_to_lum
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_luminance_peaks_near_555nm() {
        let y = cie_color_coefficient_at_wavelength(555.0)[1];
        assert_relative_eq!(y, 1.0, epsilon = 0.01);
        assert!(cie_color_coefficient_at_wavelength(450.0)[1] < y);
        assert!(cie_color_coefficient_at_wavelength(650.0)[1] < y);
    }

    #[test]
    fn test_outside_visible_range_is_black() {
        assert_eq!(cie_color_coefficient_at_wavelength(300.0), [0f64; 3]);
        assert_eq!(cie_color_coefficient_at_wavelength(900.0), [0f64; 3]);
    }

    #[test]
    fn test_green_wavelength_is_green() {
        let rgb = wavelength_to_srgb(550.0, 1.0);
        assert!(rgb[1] > rgb[0]);
        assert!(rgb[1] > rgb[2]);
    }

    #[test]
    fn test_rad_to_lum_has_wavelengths_in_columns() {
        let lambdas = [450.0, 550.0, 650.0, 700.0];
        let m = rad_to_lum_for(lambdas, 10.0);
        for (column, &lambda) in lambdas.iter().enumerate() {
            let rgb = wavelength_to_srgb(lambda, 10.0);
            for row in 0..3 {
                assert_relative_eq!(m[(row, column)], rgb[row]);
            }
            assert_eq!(m[(3, column)], 0.0);
        }
    }
}
