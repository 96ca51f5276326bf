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

// All code in this module is heavily inspired by -- and all too
// frequently directly copied from -- the most excellent:
//     https://ebruneton.github.io/precomputed_atmospheric_scattering/
// Which is:
//     Copyright (c) 2017 Eric Bruneton
// All errors and omissions below were introduced in transcription
// to Rust and are not reflective of the high quality of the
// original work in any way.
pub mod colorspace;
pub mod earth_consts;
pub mod error;
pub mod geometry;
pub mod precompute;
pub mod single_scattering;
pub mod table_helpers;
pub mod texture;
pub mod transmittance;

pub use crate::{
    earth_consts::{AtmosphereParameters, DensityProfile, DensityProfileLayer, EarthParameters},
    error::AtmosphereError,
    precompute::{AtmosphereLuts, Precompute, PrecomputeConfig},
    single_scattering::{compute_single_scattering_texel, SINGLE_SCATTERING_SAMPLE_COUNT},
    table_helpers::{ScatterCoord, ScatteringTextureSize, TransmittanceTextureSize},
    texture::{TexelStore, Texture2d, Texture3d},
    transmittance::{TransmittanceLookup, TransmittanceTable},
};
