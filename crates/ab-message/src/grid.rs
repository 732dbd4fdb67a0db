//! Fixed spatial bin grid.
//!
//! The grid is derived once from the environment bounds and the interaction
//! radius: each axis has `ceil((max - min) / radius)` bins (at least one), so
//! every neighbour within `radius` of a position lies in the 3×3 (or 3×3×3)
//! block of bins around it.  Positions outside the bounds are clamped into
//! the edge bins.

use ab_core::AbError;

use crate::{MessageError, MessageResult, SpatialBounds};

#[derive(Clone, Debug, PartialEq)]
pub struct SpatialGrid {
    min:        [f32; 3],
    radius:     f32,
    dims:       [u32; 3],
    dimensions: usize,
}

impl SpatialGrid {
    /// `dimensions` is 2 or 3; a 2-D grid has a single z layer.
    pub fn new(bounds: &SpatialBounds, dimensions: usize) -> MessageResult<Self> {
        if !(bounds.radius > 0.0) || !bounds.radius.is_finite() {
            return Err(AbError::InvalidArgument(format!(
                "spatial radius must be positive, got {}",
                bounds.radius
            ))
            .into());
        }
        let mut dims = [1u32; 3];
        for axis in 0..dimensions.min(3) {
            let extent = bounds.max[axis] - bounds.min[axis];
            if !(extent >= 0.0) {
                return Err(AbError::InvalidArgument(format!(
                    "spatial bounds on axis {axis} are inverted ({} > {})",
                    bounds.min[axis], bounds.max[axis]
                ))
                .into());
            }
            let bins = (extent / bounds.radius).ceil().max(1.0);
            // u32::MAX as f32 rounds up to 2^32.
            if bins >= u32::MAX as f32 {
                return Err(too_many_bins(bounds));
            }
            dims[axis] = bins as u32;
        }
        // Bin ids and the PBM's `bin_count + 1` entries must fit in u32.
        match dims.iter().try_fold(1u32, |acc, &d| acc.checked_mul(d)) {
            Some(total) if total < u32::MAX => {}
            _ => return Err(too_many_bins(bounds)),
        }
        Ok(Self { min: bounds.min, radius: bounds.radius, dims, dimensions })
    }

    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn bin_count(&self) -> u32 {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Grid cell containing `pos`, clamped into the grid.
    pub fn cell_of(&self, pos: [f32; 3]) -> [u32; 3] {
        let mut cell = [0u32; 3];
        for axis in 0..self.dimensions {
            let f = ((pos[axis] - self.min[axis]) / self.radius).floor();
            // NaN and negatives land in bin 0.
            cell[axis] = if f > 0.0 { (f as u32).min(self.dims[axis] - 1) } else { 0 };
        }
        cell
    }

    #[inline]
    pub fn bin_of_cell(&self, cell: [u32; 3]) -> u32 {
        cell[0] + cell[1] * self.dims[0] + cell[2] * self.dims[0] * self.dims[1]
    }

    #[inline]
    pub fn bin_of(&self, pos: [f32; 3]) -> u32 {
        self.bin_of_cell(self.cell_of(pos))
    }

    /// The Moore neighbourhood of `pos` as inclusive `(first_bin, last_bin)`
    /// strips along x, clipped at the grid edge.  Bins within a strip are
    /// contiguous, so each strip maps to one contiguous PBM range.
    pub fn neighbourhood(&self, pos: [f32; 3]) -> Vec<(u32, u32)> {
        let cell = self.cell_of(pos);
        let span = |axis: usize| {
            let lo = cell[axis].saturating_sub(1);
            let hi = (cell[axis] + 1).min(self.dims[axis] - 1);
            (lo, hi)
        };
        let (x0, x1) = span(0);
        let (y0, y1) = span(1);
        let (z0, z1) = span(2);
        let mut strips = Vec::with_capacity(9);
        for z in z0..=z1 {
            for y in y0..=y1 {
                strips.push((self.bin_of_cell([x0, y, z]), self.bin_of_cell([x1, y, z])));
            }
        }
        strips
    }
}

fn too_many_bins(bounds: &SpatialBounds) -> MessageError {
    AbError::InvalidArgument(format!(
        "spatial bounds {:?}..{:?} with radius {} need more than u32::MAX bins",
        bounds.min, bounds.max, bounds.radius
    ))
    .into()
}
