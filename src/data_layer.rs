//! Scalar fields co-addressed with a space.

use log::debug;
use rayon::prelude::*;
use spark_common::{LayerParams, LayerSnapshot, Neighborhood, Vector};

#[derive(Debug, Clone, Copy, PartialEq)]
enum LayerWrite {
    Set(f64),
    Add(f64),
}

/// A 2D/3D grid of `f64` values with diffusion and evaporation.
///
/// Agent writes made during a step phase are staged with [`DataLayer::stage_add`] /
/// [`DataLayer::stage_set`] and land at the next commit, so every agent in a phase reads
/// the same field.
#[derive(Debug, Clone)]
pub struct DataLayer {
    params: LayerParams,
    values: Vec<f64>,
    scratch: Vec<f64>,
    offsets: Vec<[i64; 3]>,
    pending: Vec<(usize, LayerWrite)>,
}

fn kernel(dimension: usize, neighborhood: Neighborhood) -> Vec<[i64; 3]> {
    let mut offsets = Vec::new();
    let zs: &[i64] = if dimension == 3 { &[-1, 0, 1] } else { &[0] };
    for &dz in zs {
        for dy in -1..=1i64 {
            for dx in -1..=1i64 {
                let manhattan = dx.abs() + dy.abs() + dz.abs();
                let keep = match neighborhood {
                    Neighborhood::VonNeumann => manhattan == 1,
                    Neighborhood::Moore => manhattan > 0,
                };
                if keep {
                    offsets.push([dx, dy, dz]);
                }
            }
        }
    }
    offsets
}

impl DataLayer {
    pub fn new(params: LayerParams) -> Self {
        let n = params.num_cells();
        debug!(
            "Creating data layer '{}' over '{}' with {:?} cells",
            params.name, params.space, params.dims
        );
        DataLayer {
            offsets: kernel(params.dimension, params.neighborhood),
            values: vec![params.initial; n],
            scratch: vec![0.0; n],
            pending: Vec::new(),
            params,
        }
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn params(&self) -> &LayerParams {
        &self.params
    }

    pub fn dims(&self) -> [usize; 3] {
        self.params.dims
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    fn flat(&self, c: [usize; 3]) -> usize {
        let d = self.params.dims;
        (c[2] * d[1] + c[1]) * d[0] + c[0]
    }

    /// Resolves a possibly out-of-range cell coordinate: wrap, or `None` past a bounded edge.
    #[inline]
    fn resolve(&self, axis: usize, c: i64) -> Option<usize> {
        let n = self.params.dims[axis] as i64;
        if (0..n).contains(&c) {
            Some(c as usize)
        } else if self.params.wrap[axis] {
            Some(c.rem_euclid(n) as usize)
        } else {
            None
        }
    }

    /// Floor cell of a continuous position; wrapped or clamped per axis.
    pub fn cell_of(&self, p: Vector) -> [usize; 3] {
        let mut c = [0usize; 3];
        for (axis, slot) in c.iter_mut().enumerate().take(self.params.dimension) {
            let n = self.params.dims[axis] as i64;
            let raw = ((p.axis(axis) - self.params.origin[axis]) / self.params.step[axis]).floor() as i64;
            *slot = match self.resolve(axis, raw) {
                Some(v) => v,
                None => raw.clamp(0, n - 1) as usize,
            };
        }
        c
    }

    pub fn index_of(&self, p: Vector) -> usize {
        self.flat(self.cell_of(p))
    }

    pub fn value(&self, p: Vector) -> f64 {
        self.values[self.index_of(p)]
    }

    pub fn set_value(&mut self, p: Vector, v: f64) {
        let i = self.index_of(p);
        self.values[i] = v;
    }

    pub fn add_value(&mut self, p: Vector, delta: f64) {
        let i = self.index_of(p);
        self.values[i] += delta;
    }

    pub fn value_at(&self, cell: usize) -> f64 {
        self.values[cell]
    }

    pub fn stage_set(&mut self, p: Vector, v: f64) {
        let i = self.index_of(p);
        self.pending.push((i, LayerWrite::Set(v)));
    }

    pub fn stage_add(&mut self, p: Vector, delta: f64) {
        let i = self.index_of(p);
        self.pending.push((i, LayerWrite::Add(delta)));
    }

    /// Applies staged writes in the order they were made.
    pub fn commit_writes(&mut self) -> usize {
        let count = self.pending.len();
        for (i, w) in self.pending.drain(..) {
            match w {
                LayerWrite::Set(v) => self.values[i] = v,
                LayerWrite::Add(d) => self.values[i] += d,
            }
        }
        count
    }

    /// Conservative diffusion: each round every cell hands `diffusion / K` of its value to
    /// each of its `K` kernel neighbours. Shares aimed past a bounded edge stay home, so the
    /// total is preserved.
    pub fn diffuse(&mut self, rounds: usize) {
        let rate = self.params.diffusion;
        if rate <= 0.0 || self.values.is_empty() {
            return;
        }
        let k = self.offsets.len() as f64;
        let share = rate / k;
        let dims = self.params.dims;

        for _ in 0..rounds {
            self.scratch.copy_from_slice(&self.values);
            let this = &*self;
            let updated: Vec<f64> = (0..this.scratch.len())
                .into_par_iter()
                .map(|idx| {
                    let x = (idx % dims[0]) as i64;
                    let y = ((idx / dims[0]) % dims[1]) as i64;
                    let z = (idx / (dims[0] * dims[1])) as i64;
                    let old = this.scratch[idx];
                    let mut inflow = 0.0;
                    let mut given = 0.0;
                    for o in &this.offsets {
                        let neighbour = this
                            .resolve(0, x + o[0])
                            .zip(this.resolve(1, y + o[1]))
                            .zip(this.resolve(2, z + o[2]));
                        if let Some(((nx, ny), nz)) = neighbour {
                            inflow += this.scratch[this.flat([nx, ny, nz])];
                            given += 1.0;
                        }
                    }
                    old - share * old * given + share * inflow
                })
                .collect();
            self.values = updated;
        }
    }

    /// Scales every cell (evaporation).
    pub fn multiply(&mut self, factor: f64) {
        self.values.par_iter_mut().for_each(|v| *v *= factor);
    }

    pub fn fill(&mut self, v: f64) {
        self.values.iter_mut().for_each(|x| *x = v);
    }

    /// Sum of all cells.
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Central-difference gradient at the cell containing `p`, pointing uphill.
    /// At a bounded edge the missing neighbour is replaced by the cell itself.
    pub fn gradient(&self, p: Vector) -> Vector {
        let c = self.cell_of(p);
        let here = self.values[self.flat(c)];
        let mut g = Vector::ZERO;
        for axis in 0..self.params.dimension {
            let sample = |delta: i64| {
                match self.resolve(axis, c[axis] as i64 + delta) {
                    Some(v) => {
                        let mut n = c;
                        n[axis] = v;
                        self.values[self.flat(n)]
                    }
                    None => here,
                }
            };
            let d = (sample(1) - sample(-1)) / (2.0 * self.params.step[axis]);
            g = g.with_axis(axis, d);
        }
        g
    }

    /// Once-per-tick dynamics: one diffusion round, then evaporation.
    pub fn tick_dynamics(&mut self) {
        if self.params.diffusion > 0.0 {
            self.diffuse(1);
        }
        if self.params.evaporation != 1.0 {
            self.multiply(self.params.evaporation);
        }
    }

    /// Cells within `width` cells of any face, with their values, for border exchange.
    pub fn border_cells(&self, width: usize) -> Vec<(usize, f64)> {
        let dims = self.params.dims;
        (0..self.values.len())
            .filter(|&idx| {
                let c = [idx % dims[0], (idx / dims[0]) % dims[1], idx / (dims[0] * dims[1])];
                (0..self.params.dimension).any(|a| c[a] < width || c[a] + width >= dims[a])
            })
            .map(|idx| (idx, self.values[idx]))
            .collect()
    }

    /// Overwrites cells received from a neighbouring rank. Out-of-range indices are ignored.
    pub fn merge_cells(&mut self, cells: &[(usize, f64)]) {
        for &(idx, v) in cells {
            if let Some(slot) = self.values.get_mut(idx) {
                *slot = v;
            }
        }
    }

    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            name: self.params.name.clone(),
            dims: self.params.dims,
            values: self.values.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spark_common::SpaceParams;

    fn layer(wrap: bool, neighborhood: Neighborhood, diffusion: f64) -> DataLayer {
        let space = SpaceParams::from_bounds("s", &[0.0, 0.0], &[10.0, 10.0], &[wrap, wrap], 1.0).unwrap();
        DataLayer::new(LayerParams::over_space("food", &space, &[1.0], diffusion, 1.0, neighborhood, 0.0).unwrap())
    }

    #[test]
    fn kernel_sizes() {
        assert_eq!(kernel(2, Neighborhood::VonNeumann).len(), 4);
        assert_eq!(kernel(2, Neighborhood::Moore).len(), 8);
        assert_eq!(kernel(3, Neighborhood::VonNeumann).len(), 6);
        assert_eq!(kernel(3, Neighborhood::Moore).len(), 26);
    }

    #[test]
    fn position_maps_by_floor_and_wraps() {
        let mut l = layer(true, Neighborhood::Moore, 0.0);
        l.set_value(Vector::xy(10.5, -0.5), 3.0);
        assert_eq!(l.cell_of(Vector::xy(10.5, -0.5)), [0, 9, 0]);
        assert_eq!(l.value(Vector::xy(0.2, 9.9)), 3.0);
    }

    #[test]
    fn bounded_layer_clamps() {
        let l = layer(false, Neighborhood::Moore, 0.0);
        assert_eq!(l.cell_of(Vector::xy(-4.0, 42.0)), [0, 9, 0]);
    }

    #[test]
    fn diffusion_conserves_on_bounded_grid() {
        for nb in [Neighborhood::VonNeumann, Neighborhood::Moore] {
            let mut l = layer(false, nb, 0.5);
            l.set_value(Vector::xy(0.5, 0.5), 100.0);
            l.set_value(Vector::xy(5.5, 5.5), 40.0);
            l.diffuse(25);
            assert!((l.total() - 140.0).abs() < 1e-9, "{:?}: {}", nb, l.total());
            assert!(l.min() >= 0.0);
        }
    }

    #[test]
    fn diffusion_spreads_to_neighbours() {
        let mut l = layer(true, Neighborhood::VonNeumann, 0.4);
        l.set_value(Vector::xy(0.5, 0.5), 1.0);
        l.diffuse(1);
        assert!((l.value(Vector::xy(0.5, 0.5)) - 0.6).abs() < 1e-12);
        assert!((l.value(Vector::xy(9.5, 0.5)) - 0.1).abs() < 1e-12);
        assert_eq!(l.value(Vector::xy(9.5, 9.5)), 0.0);
    }

    #[test]
    fn staged_writes_apply_on_commit() {
        let mut l = layer(true, Neighborhood::Moore, 0.0);
        let p = Vector::xy(2.5, 2.5);
        l.stage_add(p, 1.0);
        l.stage_add(p, 2.0);
        assert_eq!(l.value(p), 0.0);
        assert_eq!(l.commit_writes(), 2);
        assert_eq!(l.value(p), 3.0);
    }

    #[test]
    fn gradient_points_uphill() {
        let mut l = layer(false, Neighborhood::Moore, 0.0);
        for x in 0..10 {
            l.set_value(Vector::xy(x as f64 + 0.5, 5.5), x as f64);
        }
        let g = l.gradient(Vector::xy(4.5, 5.5));
        assert!((g.x - 1.0).abs() < 1e-12);
        assert_eq!(g.y, 0.0);
    }

    #[test]
    fn evaporation_decreases_total() {
        let mut l = layer(true, Neighborhood::Moore, 0.0);
        l.fill(1.0);
        let before = l.total();
        l.multiply(0.9);
        assert!(l.total() < before);
    }

    #[test]
    fn border_cells_cover_the_rim() {
        let l = layer(false, Neighborhood::Moore, 0.0);
        assert_eq!(l.border_cells(1).len(), 36);
    }
}
