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
    colorspace::{rad_to_lum_for, MAX_LAMBDA, MIN_LAMBDA},
    earth_consts::{AtmosphereParameters, EarthParameters, RGB_LAMBDAS},
    single_scattering::{compute_single_scattering_texel, SINGLE_SCATTERING_SAMPLE_COUNT},
    table_helpers::{ScatteringTextureSize, TransmittanceTextureSize},
    texture::{voxel_of_index, TexelSlot, Texture3d},
    transmittance::{TransmittanceLookup, TransmittanceTable},
};
use anyhow::{ensure, Result};
use log::{debug, info, trace};
use nalgebra::{Matrix4, Vector3};
use rayon::prelude::*;
use std::{fs, path::Path, time::Instant};

const NUM_PRECOMPUTED_WAVELENGTHS: usize = 40;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PrecomputeConfig {
    // Spread over the visible range in groups of four.
    pub num_precomputed_wavelengths: usize,
    pub transmittance_size: TransmittanceTextureSize,
    pub scattering_size: ScatteringTextureSize,
    // Trapezoids per view ray in the single scattering integral.
    pub sample_count: usize,
}

impl Default for PrecomputeConfig {
    fn default() -> Self {
        Self {
            num_precomputed_wavelengths: NUM_PRECOMPUTED_WAVELENGTHS,
            transmittance_size: TransmittanceTextureSize::default(),
            scattering_size: ScatteringTextureSize::default(),
            sample_count: SINGLE_SCATTERING_SAMPLE_COUNT,
        }
    }
}

impl PrecomputeConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.num_precomputed_wavelengths > 0,
            "need at least one precomputed wavelength"
        );
        ensure!(self.sample_count > 0, "need at least one sample per ray");
        self.transmittance_size.validate()?;
        self.scattering_size.validate()?;
        Ok(())
    }
}

/// The finished tables, converted to luminance in linear sRGB.
pub struct AtmosphereLuts {
    // The atmosphere at RGB_LAMBDAS, which render time lookups should use.
    pub srgb_atmosphere: AtmosphereParameters,
    pub transmittance: TransmittanceTable,
    pub scattering: Texture3d,
    pub single_mie_scattering: Texture3d,
}

impl AtmosphereLuts {
    /// Write every table as a stack of tone mapped png layers.
    pub fn dump(&self, directory: &Path) -> Result<()> {
        fs::create_dir_all(directory)?;
        self.transmittance
            .texture()
            .dump_png(&directory.join("transmittance"))?;
        self.scattering.dump_png(&directory.join("scattering"))?;
        self.single_mie_scattering
            .dump_png(&directory.join("single-mie-scattering"))?;
        Ok(())
    }
}

pub struct Precompute {
    config: PrecomputeConfig,
    params: EarthParameters,

    // Temporary textures.
    delta_rayleigh_scattering_texture: Texture3d,
    delta_mie_scattering_texture: Texture3d,

    // Accumulator textures.
    scattering_texture: Texture3d,
    single_mie_scattering_texture: Texture3d,
}

impl Precompute {
    pub fn precompute(config: PrecomputeConfig) -> Result<AtmosphereLuts> {
        Self::new(config)?.build_textures()
    }

    pub fn new(config: PrecomputeConfig) -> Result<Self> {
        config.validate()?;
        let params = EarthParameters::new();
        params.sample(RGB_LAMBDAS).validate()?;

        let extent = config.scattering_size.extent();
        trace!("allocating scattering textures of {:?}", extent);
        let texture = || Texture3d::new(extent.x, extent.y, extent.z);
        Ok(Self {
            config,
            params,
            delta_rayleigh_scattering_texture: texture(),
            delta_mie_scattering_texture: texture(),
            scattering_texture: texture(),
            single_mie_scattering_texture: texture(),
        })
    }

    pub fn build_textures(mut self) -> Result<AtmosphereLuts> {
        trace!("building atmosphere tables");
        self.scattering_texture.clear();
        self.single_mie_scattering_texture.clear();

        let num_iterations = (self.config.num_precomputed_wavelengths + 3) / 4;
        let delta_lambda = (MAX_LAMBDA - MIN_LAMBDA) / (4.0 * num_iterations as f64);
        for i in 0..num_iterations {
            let lambdas = [
                MIN_LAMBDA + (4.0 * i as f64 + 0.5) * delta_lambda,
                MIN_LAMBDA + (4.0 * i as f64 + 1.5) * delta_lambda,
                MIN_LAMBDA + (4.0 * i as f64 + 2.5) * delta_lambda,
                MIN_LAMBDA + (4.0 * i as f64 + 3.5) * delta_lambda,
            ];
            // Do not include MAX_LUMINOUS_EFFICACY here to keep values
            // as close to 0 as possible to preserve maximal precision.
            // It is included in sky_spectral_radiance_to_luminance.
            let rad_to_lum = rad_to_lum_for(lambdas, delta_lambda);
            self.precompute_one_step(lambdas, &rad_to_lum)?;
        }

        // Rebuild transmittance at RGB instead of high UV.
        let srgb_atmosphere = self.params.sample(RGB_LAMBDAS);
        let transmittance =
            TransmittanceTable::build(&srgb_atmosphere, self.config.transmittance_size);

        let (lo, hi) = self.scattering_texture.range();
        debug!("scattering range: {} -> {}", lo, hi);
        let (lo, hi) = self.single_mie_scattering_texture.range();
        debug!("single mie scattering range: {} -> {}", lo, hi);

        Ok(AtmosphereLuts {
            srgb_atmosphere,
            transmittance,
            scattering: self.scattering_texture,
            single_mie_scattering: self.single_mie_scattering_texture,
        })
    }

    fn precompute_one_step(&mut self, lambdas: [f64; 4], rad_to_lum: &Matrix4<f64>) -> Result<()> {
        let atmosphere = self.params.sample(lambdas);
        atmosphere.validate()?;

        let transmittance_start = Instant::now();
        let transmittance = TransmittanceTable::build(&atmosphere, self.config.transmittance_size);
        let transmittance_time = transmittance_start.elapsed();
        info!(
            "transmittance      {:?}: {}.{:03}ms",
            lambdas,
            transmittance_time.as_millis(),
            transmittance_time.subsec_micros() % 1000
        );

        let single_scattering_start = Instant::now();
        compute_single_scattering_pass(
            &self.config.scattering_size,
            rad_to_lum,
            &atmosphere,
            &transmittance,
            &mut self.delta_rayleigh_scattering_texture,
            &mut self.delta_mie_scattering_texture,
            &mut self.scattering_texture,
            &mut self.single_mie_scattering_texture,
            self.config.sample_count,
        );
        let single_scattering_time = single_scattering_start.elapsed();
        info!(
            "single-scattering  {:?}: {}.{:03}ms",
            lambdas,
            single_scattering_time.as_millis(),
            single_scattering_time.subsec_micros() % 1000
        );

        Ok(())
    }
}

fn accumulate(texel: &mut [f32; 4], luminance: &Vector3<f64>) {
    for (acc, v) in texel.iter_mut().zip(luminance.iter()) {
        *acc += *v as f32;
    }
}

/// Run the single scattering kernel over every voxel of the scattering
/// tables at once. The delta tables are overwritten; luminance is added
/// into the accumulators.
#[allow(clippy::too_many_arguments)]
pub fn compute_single_scattering_pass(
    size: &ScatteringTextureSize,
    rad_to_lum: &Matrix4<f64>,
    atmosphere: &AtmosphereParameters,
    transmittance: &impl TransmittanceLookup,
    delta_rayleigh: &mut Texture3d,
    delta_mie: &mut Texture3d,
    scattering: &mut Texture3d,
    single_mie_scattering: &mut Texture3d,
    sample_count: usize,
) {
    let extent = size.extent();
    debug_assert_eq!(delta_rayleigh.extent(), extent);
    debug_assert_eq!(delta_mie.extent(), extent);
    debug_assert_eq!(scattering.extent(), extent);
    debug_assert_eq!(single_mie_scattering.extent(), extent);

    delta_rayleigh
        .texels_mut()
        .par_iter_mut()
        .zip(delta_mie.texels_mut().par_iter_mut())
        .zip(scattering.texels_mut().par_iter_mut())
        .zip(single_mie_scattering.texels_mut().par_iter_mut())
        .enumerate()
        .for_each(
            |(i, (((rayleigh_texel, mie_texel), scattering_texel), single_mie_texel))| {
                let voxel = voxel_of_index(extent, i);
                let (scattering_lum, single_mie_lum) = compute_single_scattering_texel(
                    voxel,
                    size,
                    rad_to_lum,
                    atmosphere,
                    transmittance,
                    &mut TexelSlot::new(voxel, rayleigh_texel),
                    &mut TexelSlot::new(voxel, mie_texel),
                    sample_count,
                );
                accumulate(scattering_texel, &scattering_lum);
                accumulate(single_mie_texel, &single_mie_lum);
            },
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{geometry::tests::test_atmosphere, transmittance::tests::UnitTransmittance};
    use approx::assert_relative_eq;

    fn tiny_config() -> PrecomputeConfig {
        PrecomputeConfig {
            num_precomputed_wavelengths: 4,
            transmittance_size: TransmittanceTextureSize {
                width: 32,
                height: 8,
            },
            scattering_size: ScatteringTextureSize {
                r: 4,
                mu: 8,
                mu_s: 4,
                nu: 2,
            },
            sample_count: 8,
        }
    }

    #[test]
    fn test_pass_writes_every_voxel() {
        let atmosphere = test_atmosphere();
        let size = tiny_config().scattering_size;
        let extent = size.extent();
        let texture = || Texture3d::new(extent.x, extent.y, extent.z);
        let mut delta_rayleigh = texture();
        let mut delta_mie = texture();
        let mut scattering = texture();
        let mut single_mie_scattering = texture();
        for texel in delta_rayleigh
            .texels_mut()
            .iter_mut()
            .chain(delta_mie.texels_mut().iter_mut())
        {
            *texel = [-1f32; 4];
        }

        compute_single_scattering_pass(
            &size,
            &Matrix4::identity(),
            &atmosphere,
            &UnitTransmittance,
            &mut delta_rayleigh,
            &mut delta_mie,
            &mut scattering,
            &mut single_mie_scattering,
            SINGLE_SCATTERING_SAMPLE_COUNT,
        );

        assert!(delta_rayleigh.range().0 >= 0.0);
        assert!(delta_mie.range().0 >= 0.0);
        assert!(delta_rayleigh.range().1 > 0.0);
        for i in 0..delta_rayleigh.texels().len() {
            let voxel = delta_rayleigh.voxel_of(i);
            let rayleigh = delta_rayleigh.get(voxel);
            let acc = scattering.get(voxel);
            assert_relative_eq!(acc.xyz(), rayleigh.xyz());
            assert_relative_eq!(acc.w, 0.0);
            let mie = delta_mie.get(voxel);
            let acc = single_mie_scattering.get(voxel);
            assert_relative_eq!(acc.xyz(), mie.xyz());
            assert_relative_eq!(acc.w, 0.0);
        }
    }

    #[test]
    fn test_pass_accumulates() {
        let atmosphere = test_atmosphere();
        let size = tiny_config().scattering_size;
        let extent = size.extent();
        let texture = || Texture3d::new(extent.x, extent.y, extent.z);
        let mut delta_rayleigh = texture();
        let mut delta_mie = texture();
        let mut scattering = texture();
        let mut single_mie_scattering = texture();
        for _ in 0..2 {
            compute_single_scattering_pass(
                &size,
                &Matrix4::identity(),
                &atmosphere,
                &UnitTransmittance,
                &mut delta_rayleigh,
                &mut delta_mie,
                &mut scattering,
                &mut single_mie_scattering,
                SINGLE_SCATTERING_SAMPLE_COUNT,
            );
        }
        let (_, single) = delta_rayleigh.range();
        let (_, double) = scattering.range();
        assert_relative_eq!(double, 2.0 * single, max_relative = 1e-6);
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = PrecomputeConfig {
            sample_count: 0,
            ..tiny_config()
        };
        assert!(Precompute::new(config).is_err());
        let mut config = tiny_config();
        config.scattering_size.nu = 1;
        assert!(Precompute::new(config).is_err());
        let config = PrecomputeConfig {
            num_precomputed_wavelengths: 0,
            ..tiny_config()
        };
        assert!(Precompute::new(config).is_err());
    }

    #[test]
    fn test_tiny_precompute() -> Result<()> {
        let precompute_start = Instant::now();
        let luts = Precompute::precompute(tiny_config())?;
        let precompute_time = precompute_start.elapsed();
        println!(
            "Precompute::precompute timing: {}ms",
            precompute_time.as_millis()
        );

        assert_eq!(luts.scattering.extent(), Vector3::new(8, 8, 4));
        assert_eq!(luts.transmittance.size().width, 32);
        // Individual channels may dip below zero with this few wavelengths,
        // since the sRGB primaries are not spectrally pure.
        let (lo, hi) = luts.scattering.range();
        assert!(lo.is_finite());
        assert!(hi > 0.0 && hi.is_finite());
        let (lo, hi) = luts.single_mie_scattering.range();
        assert!(lo.is_finite());
        assert!(hi > 0.0 && hi.is_finite());
        for texel in luts.scattering.texels() {
            assert_eq!(texel[3], 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_dump() -> Result<()> {
        let luts = Precompute::precompute(tiny_config())?;
        let directory = std::env::temp_dir().join(format!(
            "atmosphere-lut-test-dump-{}",
            std::process::id()
        ));
        luts.dump(&directory)?;
        assert!(directory.join("transmittance-layer00.png").exists());
        assert!(directory.join("scattering-layer03.png").exists());
        assert!(directory.join("single-mie-scattering-alpha-layer00.png").exists());
        fs::remove_dir_all(&directory)?;
        Ok(())
    }
}
