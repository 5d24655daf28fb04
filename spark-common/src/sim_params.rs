use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::vecmath::Vector;

/// One axis of a simulation domain: `[min, max)` with periodic or clamped boundaries.
///
/// Unused axes (z in a 2D space) are degenerate: `min == max == 0`, never wrapped.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisParams {
    pub min: f64,
    pub max: f64,
    pub wrap: bool,
}

impl AxisParams {
    pub const DEGENERATE: AxisParams = AxisParams { min: 0.0, max: 0.0, wrap: false };

    pub fn size(&self) -> f64 {
        self.max - self.min
    }

    /// Brings a coordinate back into the domain: modulo for wrapped axes, clamp otherwise.
    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        let size = self.size();
        if size <= 0.0 {
            return self.min;
        }
        if self.wrap {
            let mut v = self.min + (value - self.min).rem_euclid(size);
            // rem_euclid can round up to exactly `size` for tiny negative offsets
            if v >= self.max {
                v = self.min;
            }
            v
        } else {
            value.max(self.min).min(self.max)
        }
    }

    /// Shortest signed displacement from `a` to `b` along this axis.
    #[inline]
    pub fn displacement(&self, a: f64, b: f64) -> f64 {
        let mut d = b - a;
        if self.wrap {
            let size = self.size();
            if d.abs() > size * 0.5 {
                d -= d.signum() * size;
            }
        }
        d
    }
}

/// Runtime parameters of one space, derived from its configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceParams {
    pub name: String,
    /// 2 or 3.
    pub dimension: usize,
    pub axes: [AxisParams; 3],
    /// Requested cell size; the effective per-axis extent may be slightly smaller.
    pub cell_size: f64,
    /// Cell counts per axis; the unused z axis of a 2D space has one cell.
    pub dims: [usize; 3],
    /// Per-axis cell extent, `size / dims`, so cells tile every axis exactly (needed for wrapping).
    pub cell_extent: [f64; 3],
    pub inv_cell_extent: [f64; 3],
    pub num_cells: usize,
}

impl SpaceParams {
    /// Validates bounds and derives the cell grid.
    pub fn from_bounds(
        name: &str,
        min: &[f64],
        max: &[f64],
        wrap: &[bool],
        cell_size: f64,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidSpace { space: name.to_string(), reason };
        let dimension = min.len();
        if !(2..=3).contains(&dimension) || max.len() != dimension {
            return Err(invalid(format!(
                "min and max must both have 2 or 3 components (got {} and {})",
                min.len(),
                max.len()
            )));
        }
        if wrap.len() > dimension {
            return Err(invalid(format!("wrap has {} entries for a {}D space", wrap.len(), dimension)));
        }
        if !(cell_size > 0.0) || !cell_size.is_finite() {
            return Err(invalid(format!("cell_size must be positive (got {})", cell_size)));
        }

        let mut axes = [AxisParams::DEGENERATE; 3];
        let mut dims = [1usize; 3];
        let mut cell_extent = [1.0; 3];
        for axis in 0..dimension {
            if !(min[axis] < max[axis]) || !min[axis].is_finite() || !max[axis].is_finite() {
                return Err(invalid(format!(
                    "axis {} has min {} >= max {}",
                    axis, min[axis], max[axis]
                )));
            }
            axes[axis] = AxisParams {
                min: min[axis],
                max: max[axis],
                wrap: wrap.get(axis).copied().unwrap_or(false),
            };
            dims[axis] = ((max[axis] - min[axis]) / cell_size).ceil().max(1.0) as usize;
            cell_extent[axis] = (max[axis] - min[axis]) / dims[axis] as f64;
        }

        Ok(SpaceParams {
            name: name.to_string(),
            dimension,
            axes,
            cell_size,
            dims,
            cell_extent,
            inv_cell_extent: [
                1.0 / cell_extent[0],
                1.0 / cell_extent[1],
                1.0 / cell_extent[2],
            ],
            num_cells: dims[0] * dims[1] * dims[2],
        })
    }

    /// Normalises every axis of a position (wrap or clamp).
    pub fn normalize(&self, p: Vector) -> Vector {
        Vector::new(
            self.axes[0].normalize(p.x),
            self.axes[1].normalize(p.y),
            self.axes[2].normalize(p.z),
        )
    }

    /// Folds wrapped axes back into the domain and collapses degenerate ones. Bounded
    /// axes keep the raw coordinate, so a point outside stays outside.
    pub fn wrap_point(&self, p: Vector) -> Vector {
        let fold = |axis: &AxisParams, v: f64| {
            if axis.wrap || axis.size() <= 0.0 {
                axis.normalize(v)
            } else {
                v
            }
        };
        Vector::new(fold(&self.axes[0], p.x), fold(&self.axes[1], p.y), fold(&self.axes[2], p.z))
    }

    /// Shortest displacement from `a` to `b` honouring wrapped axes.
    pub fn displacement(&self, a: Vector, b: Vector) -> Vector {
        Vector::new(
            self.axes[0].displacement(a.x, b.x),
            self.axes[1].displacement(a.y, b.y),
            self.axes[2].displacement(a.z, b.z),
        )
    }

    /// Cell coordinate along one axis, clamped to the grid.
    #[inline]
    pub fn cell_coord(&self, axis: usize, value: f64) -> usize {
        let raw = ((value - self.axes[axis].min) * self.inv_cell_extent[axis]).floor();
        if raw <= 0.0 || raw.is_nan() {
            0
        } else {
            (raw as usize).min(self.dims[axis] - 1)
        }
    }
}

/// Diffusion kernel shape.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Neighborhood {
    /// 4 neighbours in 2D, 6 in 3D.
    VonNeumann,
    /// 8 neighbours in 2D, 26 in 3D.
    #[default]
    Moore,
}

/// Runtime parameters of a data layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerParams {
    pub name: String,
    pub space: String,
    pub dimension: usize,
    pub origin: [f64; 3],
    pub step: [f64; 3],
    pub dims: [usize; 3],
    pub wrap: [bool; 3],
    /// Fraction of a cell's value shared with its neighbours per diffusion round.
    pub diffusion: f64,
    /// Multiplier applied once per tick (1.0 = no evaporation).
    pub evaporation: f64,
    pub neighborhood: Neighborhood,
    pub initial: f64,
}

impl LayerParams {
    /// Derives a layer grid over `space`; each axis extent must be an integer multiple of its step.
    pub fn over_space(
        name: &str,
        space: &SpaceParams,
        step: &[f64],
        diffusion: f64,
        evaporation: f64,
        neighborhood: Neighborhood,
        initial: f64,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidLayer { layer: name.to_string(), reason };
        if step.len() != space.dimension && step.len() != 1 {
            return Err(invalid(format!(
                "step has {} components for a {}D space",
                step.len(),
                space.dimension
            )));
        }
        if !(0.0..=1.0).contains(&diffusion) {
            return Err(invalid(format!("diffusion must be within [0, 1] (got {})", diffusion)));
        }
        if !(evaporation >= 0.0) {
            return Err(invalid(format!("evaporation must be non-negative (got {})", evaporation)));
        }

        let mut origin = [0.0; 3];
        let mut steps = [1.0; 3];
        let mut dims = [1usize; 3];
        let mut wrap = [false; 3];
        for axis in 0..space.dimension {
            let s = if step.len() == 1 { step[0] } else { step[axis] };
            if !(s > 0.0) || !s.is_finite() {
                return Err(invalid(format!("step along axis {} must be positive (got {})", axis, s)));
            }
            let extent = space.axes[axis].size() / s;
            let n = extent.round();
            if n < 1.0 || (extent - n).abs() > 1e-9 * n.max(1.0) {
                return Err(invalid(format!(
                    "axis {} extent {} is not an integer multiple of step {}",
                    axis,
                    space.axes[axis].size(),
                    s
                )));
            }
            origin[axis] = space.axes[axis].min;
            steps[axis] = s;
            dims[axis] = n as usize;
            wrap[axis] = space.axes[axis].wrap;
        }

        Ok(LayerParams {
            name: name.to_string(),
            space: space.name.clone(),
            dimension: space.dimension,
            origin,
            step: steps,
            dims,
            wrap,
            diffusion,
            evaporation,
            neighborhood,
            initial,
        })
    }

    pub fn num_cells(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }
}

/// Force-integration settings of a physical space.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsParams {
    pub dt: f64,
    pub damping: f64,
    pub max_speed: f64,
    pub collision_stiffness: f64,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        PhysicsParams {
            dt: 1.0,
            damping: 0.9,
            max_speed: f64::INFINITY,
            collision_stiffness: 0.0,
        }
    }
}
