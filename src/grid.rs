use spark_common::{SpaceParams, Vector}; // Use shared crate

// Calculates the flat cell index (x fastest) for a position already inside the domain
#[inline(always)]
pub fn get_grid_cell_idx(pos: Vector, params: &SpaceParams) -> usize {
    let cx = params.cell_coord(0, pos.x);
    let cy = params.cell_coord(1, pos.y);
    let cz = params.cell_coord(2, pos.z);
    (cz * params.dims[1] + cy) * params.dims[0] + cx
}

/// Cell coordinates along one axis touched by `[center - reach, center + reach]`.
///
/// Wrapped axes fold indices modulo the cell count and never repeat a cell; bounded axes
/// clamp the span to the grid.
fn axis_cells(params: &SpaceParams, axis: usize, center: f64, reach: f64) -> Vec<usize> {
    let n = params.dims[axis] as i64;
    if n <= 1 {
        return vec![0];
    }
    let a = &params.axes[axis];
    let inv = params.inv_cell_extent[axis];
    let lo = ((center - reach - a.min) * inv).floor() as i64;
    let hi = ((center + reach - a.min) * inv).floor() as i64;

    if a.wrap {
        if hi - lo + 1 >= n {
            (0..n as usize).collect()
        } else {
            (lo..=hi).map(|c| c.rem_euclid(n) as usize).collect()
        }
    } else {
        let lo = lo.max(0);
        let hi = hi.min(n - 1);
        if lo > hi {
            Vec::new()
        } else {
            (lo as usize..=hi as usize).collect()
        }
    }
}

/// Calls `f` with the flat index of every cell that may hold a node within `reach` of `center`.
///
/// Each cell is visited at most once, in z, y, x order.
#[inline]
pub fn for_each_cell_in_reach<F>(center: Vector, reach: f64, params: &SpaceParams, mut f: F)
where
    F: FnMut(usize),
{
    if params.num_cells == 0 {
        return;
    }
    let xs = axis_cells(params, 0, center.x, reach);
    let ys = axis_cells(params, 1, center.y, reach);
    let zs = axis_cells(params, 2, center.z, reach);
    for &cz in &zs {
        for &cy in &ys {
            let row = (cz * params.dims[1] + cy) * params.dims[0];
            for &cx in &xs {
                f(row + cx);
            }
        }
    }
}

/// Cell coordinates `(x, y, z)` of a flat index.
#[inline]
pub fn cell_coords(idx: usize, params: &SpaceParams) -> [usize; 3] {
    let x = idx % params.dims[0];
    let rest = idx / params.dims[0];
    [x, rest % params.dims[1], rest / params.dims[1]]
}
