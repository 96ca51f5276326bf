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
use thiserror::Error;

/// Configuration mistakes that would otherwise silently produce garbage
/// tables. Nothing inside the precompute kernels can fail.
#[derive(Debug, Error, PartialEq)]
pub enum AtmosphereError {
    #[error("bottom radius {bottom} must be positive and below the top radius {top}")]
    InvalidRadii { bottom: f64, top: f64 },

    #[error("{name} must be non-negative and finite, found {value}")]
    NegativeCoefficient { name: &'static str, value: f64 },

    #[error("{name} layer width must be non-negative, found {width}")]
    NegativeLayerWidth { name: &'static str, width: f64 },

    #[error("sun angular radius must be in (0, pi/2) radians, found {0}")]
    InvalidSunAngularRadius(f64),

    #[error("mu_s_min must be in [-1, 1), found {0}")]
    InvalidMuSMin(f64),

    #[error("{name} texture size {size} is too small, need at least {min}")]
    TextureTooSmall {
        name: &'static str,
        size: u32,
        min: u32,
    },

    #[error("{name} texture of {dimensions:?} texels is too large to address")]
    TextureTooLarge {
        name: &'static str,
        dimensions: Vec<u32>,
    },

    #[error("scattering texture mu size must be even, found {0}")]
    OddMuSize(u32),
}
