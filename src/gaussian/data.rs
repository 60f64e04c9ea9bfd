use bevy::prelude::*;
use bytemuck::{
    Pod,
    Zeroable,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::{
    SplatError,
    SplatResult,
};


pub type Position = [f32; 3];
pub type Color = [f32; 4];
pub type Rotation = [f32; 4];
pub type Scale = [f32; 3];


/// a single gaussian splat in host memory.
///
/// `rotation` is a quaternion stored as `(x, y, z, w)`, `scale` is the
/// per-axis standard deviation in object space and `color` is straight
/// (non-premultiplied) rgba.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Reflect,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct Splat {
    pub position: Position,
    pub color: Color,
    pub rotation: Rotation,
    pub scale: Scale,
}


/// planar host storage for a splat node.
///
/// `total` is the declared splat count of the dataset, which may be larger
/// than what has been loaded so far while data is still streaming in. the
/// loaded count is the length of the position array.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct SplatData {
    total: usize,
    positions: Vec<Position>,
    colors: Vec<Color>,
    rotations: Vec<Rotation>,
    scales: Vec<Scale>,
}

impl SplatData {
    pub fn with_total(total: usize) -> Self {
        Self {
            total,
            positions: Vec::with_capacity(total),
            colors: Vec::with_capacity(total),
            rotations: Vec::with_capacity(total),
            scales: Vec::with_capacity(total),
        }
    }

    pub fn from_splats(splats: &[Splat]) -> Self {
        let mut data = Self::with_total(splats.len());

        for splat in splats {
            data.positions.push(splat.position);
            data.colors.push(splat.color);
            data.rotations.push(splat.rotation);
            data.scales.push(splat.scale);
        }

        data
    }

    /// build from attribute arrays produced elsewhere (e.g. a decoder).
    ///
    /// the arrays are not required to be the same length; the upload path
    /// reports any array that is shorter than the position array.
    pub fn from_planar(
        total: usize,
        positions: Vec<Position>,
        colors: Vec<Color>,
        rotations: Vec<Rotation>,
        scales: Vec<Scale>,
    ) -> SplatResult<Self> {
        if positions.len() > total {
            return Err(SplatError::DatasetOverflow {
                loaded: positions.len(),
                total,
            });
        }

        Ok(Self {
            total,
            positions,
            colors,
            rotations,
            scales,
        })
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn loaded(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.loaded() == self.total
    }

    pub fn set_total(&mut self, total: usize) -> SplatResult<()> {
        if total < self.loaded() {
            return Err(SplatError::DatasetOverflow {
                loaded: self.loaded(),
                total,
            });
        }

        self.total = total;
        Ok(())
    }

    pub fn push(&mut self, splat: Splat) -> SplatResult<()> {
        if self.loaded() >= self.total {
            return Err(SplatError::DatasetOverflow {
                loaded: self.loaded() + 1,
                total: self.total,
            });
        }

        self.positions.push(splat.position);
        self.colors.push(splat.color);
        self.rotations.push(splat.rotation);
        self.scales.push(splat.scale);

        Ok(())
    }

    /// appends as many splats as fit below the declared total and returns how
    /// many were taken. anything past the total is an overflow error and
    /// leaves the already appended prefix in place.
    pub fn extend<I>(&mut self, splats: I) -> SplatResult<usize>
    where
        I: IntoIterator<Item = Splat>,
    {
        let mut appended = 0;
        for splat in splats {
            self.push(splat)?;
            appended += 1;
        }

        Ok(appended)
    }

    pub fn get(&self, index: usize) -> Option<Splat> {
        Some(Splat {
            position: *self.positions.get(index)?,
            color: *self.colors.get(index)?,
            rotation: *self.rotations.get(index)?,
            scale: *self.scales.get(index)?,
        })
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn rotations(&self) -> &[Rotation] {
        &self.rotations
    }

    pub fn scales(&self) -> &[Scale] {
        &self.scales
    }
}
