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
use image::{ImageBuffer, Luma, Rgb};
use nalgebra::{Vector2, Vector3, Vector4};
use std::path::Path;

/// Write-only access to a 3D table of rgba texels, addressed by voxel.
pub trait TexelStore {
    fn store(&mut self, voxel: Vector3<u32>, texel: Vector4<f64>);
}

pub(crate) fn to_texel(v: Vector4<f64>) -> [f32; 4] {
    [v[0] as f32, v[1] as f32, v[2] as f32, v[3] as f32]
}

pub(crate) fn from_texel(t: &[f32; 4]) -> Vector4<f64> {
    Vector4::new(
        f64::from(t[0]),
        f64::from(t[1]),
        f64::from(t[2]),
        f64::from(t[3]),
    )
}

/// An Rgba32Float 2D texture with bilinear, clamp-to-edge sampling.
#[derive(Clone, Debug)]
pub struct Texture2d {
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

impl Texture2d {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texels: vec![[0f32; 4]; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    pub fn texels_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.texels
    }

    pub fn get(&self, x: u32, y: u32) -> Vector4<f64> {
        from_texel(&self.texels[(y * self.width + x) as usize])
    }

    pub fn set(&mut self, x: u32, y: u32, texel: Vector4<f64>) {
        self.texels[(y * self.width + x) as usize] = to_texel(texel);
    }

    /// Sample at normalized coordinates, where texel centers sit at
    /// (i + 0.5) / size.
    pub fn sample(&self, uv: Vector2<f64>) -> Vector4<f64> {
        let (x0, x1, fx) = Self::lerp_indices(uv.x, self.width);
        let (y0, y1, fy) = Self::lerp_indices(uv.y, self.height);
        let top = self.get(x0, y0) * (1.0 - fx) + self.get(x1, y0) * fx;
        let bottom = self.get(x0, y1) * (1.0 - fx) + self.get(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    fn lerp_indices(u: f64, size: u32) -> (u32, u32, f64) {
        let max = f64::from(size - 1);
        let x = (u * f64::from(size) - 0.5).clamp(0.0, max);
        let x0 = x.floor();
        let x1 = (x0 + 1.0).min(max);
        (x0 as u32, x1 as u32, x - x0)
    }

    pub fn dump_png(&self, path: &Path) -> anyhow::Result<()> {
        let (rgb, alpha) = split_pixels(&self.texels);
        save_layered(&rgb, &alpha, self.width, self.height, 1, path)
    }
}

/// The voxel at flat `index` of a 3D texture with the given extent.
pub fn voxel_of_index(extent: Vector3<u32>, index: usize) -> Vector3<u32> {
    let index = index as u32;
    Vector3::new(
        index % extent.x,
        (index / extent.x) % extent.y,
        index / (extent.x * extent.y),
    )
}

/// An Rgba32Float 3D texture. Texels are laid out x fastest, then y, then z.
#[derive(Clone, Debug)]
pub struct Texture3d {
    width: u32,
    height: u32,
    depth: u32,
    texels: Vec<[f32; 4]>,
}

impl Texture3d {
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
            texels: vec![[0f32; 4]; width as usize * height as usize * depth as usize],
        }
    }

    pub fn extent(&self) -> Vector3<u32> {
        Vector3::new(self.width, self.height, self.depth)
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    pub fn texels_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.texels
    }

    pub fn index_of(&self, voxel: Vector3<u32>) -> usize {
        debug_assert!(voxel.x < self.width && voxel.y < self.height && voxel.z < self.depth);
        ((voxel.z * self.height + voxel.y) * self.width + voxel.x) as usize
    }

    pub fn voxel_of(&self, index: usize) -> Vector3<u32> {
        voxel_of_index(self.extent(), index)
    }

    pub fn get(&self, voxel: Vector3<u32>) -> Vector4<f64> {
        from_texel(&self.texels[self.index_of(voxel)])
    }

    pub fn clear(&mut self) {
        for texel in &mut self.texels {
            *texel = [0f32; 4];
        }
    }

    /// Smallest and largest channel value anywhere in the texture.
    pub fn range(&self) -> (f32, f32) {
        self.texels
            .iter()
            .flatten()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    pub fn dump_png(&self, path: &Path) -> anyhow::Result<()> {
        let (rgb, alpha) = split_pixels(&self.texels);
        save_layered(&rgb, &alpha, self.width, self.height, self.depth, path)
    }
}

impl TexelStore for Texture3d {
    fn store(&mut self, voxel: Vector3<u32>, texel: Vector4<f64>) {
        let index = self.index_of(voxel);
        self.texels[index] = to_texel(texel);
    }
}

/// A single exclusively borrowed texel of a larger texture, handed to one
/// task of a parallel dispatch so that every task writes a disjoint voxel.
pub struct TexelSlot<'a> {
    voxel: Vector3<u32>,
    texel: &'a mut [f32; 4],
}

impl<'a> TexelSlot<'a> {
    pub fn new(voxel: Vector3<u32>, texel: &'a mut [f32; 4]) -> Self {
        Self { voxel, texel }
    }
}

impl TexelStore for TexelSlot<'_> {
    fn store(&mut self, voxel: Vector3<u32>, texel: Vector4<f64>) {
        debug_assert_eq!(voxel, self.voxel);
        *self.texel = to_texel(texel);
    }
}

// Tone map for viewing: the tables hold luminance in the hundreds to
// thousands, so apply an exposure and gamma before quantizing.
fn split_pixels(src: &[[f32; 4]]) -> (Vec<u8>, Vec<u8>) {
    const EXPOSURE: f32 = 683f32 * 0.0001f32;
    let map = |v: f32| {
        let c = (1.0 - (-v * EXPOSURE).exp()).powf(1.0 / 2.2);
        if c.is_nan() {
            0u8
        } else {
            (c.clamp(0.0, 1.0) * 255f32) as u8
        }
    };
    let mut rgb = Vec::with_capacity(src.len() * 3);
    let mut alpha = Vec::with_capacity(src.len());
    for texel in src {
        rgb.push(map(texel[0]));
        rgb.push(map(texel[1]));
        rgb.push(map(texel[2]));
        alpha.push(map(texel[3]));
    }
    (rgb, alpha)
}

fn save_layered(
    rgb: &[u8],
    alpha: &[u8],
    width: u32,
    height: u32,
    depth: u32,
    prefix: &Path,
) -> anyhow::Result<()> {
    let layer_size = (width * height) as usize;
    let prefix = prefix.to_string_lossy();
    for layer in 0..depth as usize {
        let rgb_layer = rgb[layer * layer_size * 3..(layer + 1) * layer_size * 3].to_vec();
        let img = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb_layer)
            .ok_or_else(|| anyhow::anyhow!("rgb layer {} does not fit image", layer))?;
        img.save(format!("{}-layer{:02}.png", prefix, layer))?;

        let alpha_layer = alpha[layer * layer_size..(layer + 1) * layer_size].to_vec();
        let img = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, alpha_layer)
            .ok_or_else(|| anyhow::anyhow!("alpha layer {} does not fit image", layer))?;
        img.save(format!("{}-alpha-layer{:02}.png", prefix, layer))?;
    }
    Ok(())
}
