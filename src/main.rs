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
use anyhow::Result;
use atmosphere::{Precompute, PrecomputeConfig};
use log::info;
use std::{path::PathBuf, time::Instant};
use structopt::StructOpt;

/// Precompute single scattering lookup tables for Earth's atmosphere.
/// Table sizes and sample counts not given use the library defaults.
#[derive(Debug, StructOpt)]
struct Opt {
    /// Number of wavelengths to integrate, in groups of four.
    #[structopt(short, long)]
    wavelengths: Option<usize>,

    /// Trapezoids per view ray.
    #[structopt(short, long)]
    samples: Option<usize>,

    /// Scattering table resolution in r.
    #[structopt(long)]
    r_size: Option<u32>,

    /// Scattering table resolution in mu; must be even.
    #[structopt(long)]
    mu_size: Option<u32>,

    /// Scattering table resolution in mu_s.
    #[structopt(long)]
    mu_s_size: Option<u32>,

    /// Scattering table resolution in nu.
    #[structopt(long)]
    nu_size: Option<u32>,

    /// Transmittance table width (mu).
    #[structopt(long)]
    transmittance_width: Option<u32>,

    /// Transmittance table height (r).
    #[structopt(long)]
    transmittance_height: Option<u32>,

    /// Write png layers of every table into this directory.
    #[structopt(short, long)]
    dump: Option<PathBuf>,
}

impl Opt {
    fn config(&self) -> PrecomputeConfig {
        let mut config = PrecomputeConfig::default();
        if let Some(wavelengths) = self.wavelengths {
            config.num_precomputed_wavelengths = wavelengths;
        }
        if let Some(samples) = self.samples {
            config.sample_count = samples;
        }
        let scattering = &mut config.scattering_size;
        scattering.r = self.r_size.unwrap_or(scattering.r);
        scattering.mu = self.mu_size.unwrap_or(scattering.mu);
        scattering.mu_s = self.mu_s_size.unwrap_or(scattering.mu_s);
        scattering.nu = self.nu_size.unwrap_or(scattering.nu);
        let transmittance = &mut config.transmittance_size;
        transmittance.width = self.transmittance_width.unwrap_or(transmittance.width);
        transmittance.height = self.transmittance_height.unwrap_or(transmittance.height);
        config
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let precompute_start = Instant::now();
    let luts = Precompute::precompute(opt.config())?;
    info!(
        "Precompute::precompute timing: {}ms",
        precompute_start.elapsed().as_millis()
    );

    let (lo, hi) = luts.scattering.range();
    println!("scattering:            {} -> {}", lo, hi);
    let (lo, hi) = luts.single_mie_scattering.range();
    println!("single mie scattering: {} -> {}", lo, hi);

    if let Some(directory) = opt.dump {
        luts.dump(&directory)?;
        println!("wrote tables to {}", directory.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_options_is_default_config() {
        let opt = Opt::from_iter(&["atmosphere-lut"]);
        assert_eq!(opt.config(), PrecomputeConfig::default());
    }

    #[test]
    fn test_options_override_defaults() {
        let opt = Opt::from_iter(&[
            "atmosphere-lut",
            "--samples",
            "12",
            "--nu-size",
            "4",
            "--transmittance-height",
            "16",
        ]);
        let config = opt.config();
        let defaults = PrecomputeConfig::default();
        assert_eq!(config.sample_count, 12);
        assert_eq!(config.scattering_size.nu, 4);
        assert_eq!(config.scattering_size.mu, defaults.scattering_size.mu);
        assert_eq!(config.transmittance_size.height, 16);
        assert_eq!(config.transmittance_size.width, defaults.transmittance_size.width);
        assert_eq!(
            config.num_precomputed_wavelengths,
            defaults.num_precomputed_wavelengths
        );
    }
}
