use std::collections::HashMap;

use crate::geom::Vec2;

/// Uniform spatial hash over node positions. The charge and collision
/// passes only ever care about neighbors inside a fixed cutoff, so a
/// bucket grid at that cutoff bounds the pair scans without a tree.
pub(crate) struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<usize>>,
}

impl SpatialGrid {
    pub(crate) fn build(positions: &[Vec2], cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() { cell_size.max(1.0) } else { 1.0 };
        let mut cells: HashMap<(i32, i32), Vec<usize>> = HashMap::new();
        for (index, position) in positions.iter().enumerate() {
            cells.entry(cell_key(*position, cell_size)).or_default().push(index);
        }

        Self { cell_size, cells }
    }

    /// Visit every index whose cell lies within `radius` of `point`.
    /// Coarse by construction: callers still do the exact distance check.
    pub(crate) fn for_each_within(&self, point: Vec2, radius: f32, mut visit: impl FnMut(usize)) {
        let reach = (radius / self.cell_size).ceil().max(0.0) as i32;
        let (center_x, center_y) = cell_key(point, self.cell_size);

        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let Some(bucket) = self.cells.get(&(center_x + dx, center_y + dy)) else {
                    continue;
                };
                for &index in bucket {
                    visit(index);
                }
            }
        }
    }
}

fn cell_key(position: Vec2, cell_size: f32) -> (i32, i32) {
    // NaN coordinates saturate to cell 0; the step guards catch them anyway
    ((position.x / cell_size).floor() as i32, (position.y / cell_size).floor() as i32)
}
