//! Fixed-cell spatial hash over element bounding boxes.
//!
//! Keeps neighbor queries for snap/collision candidates sub-linear as
//! element counts grow. Advisory only: the scene graph remains the source
//! of truth for geometry, and a stale grid entry can at worst cost a missed
//! or extra candidate, never wrong final geometry.

use std::collections::HashMap;

use kurbo::Rect;

pub const DEFAULT_CELL_SIZE: f64 = 128.0;

#[derive(Debug)]
pub struct SpatialHashGrid {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<String>>,
    boxes: HashMap<String, Rect>,
}

impl Default for SpatialHashGrid {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

impl SpatialHashGrid {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: if cell_size > 0.0 {
                cell_size
            } else {
                DEFAULT_CELL_SIZE
            },
            cells: HashMap::new(),
            boxes: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn bounds(&self, id: &str) -> Option<Rect> {
        self.boxes.get(id).copied()
    }

    /// Insert or move one element's box.
    pub fn upsert(&mut self, id: &str, rect: Rect) {
        self.remove(id);
        for cell in self.cells_for(rect) {
            self.cells.entry(cell).or_default().push(id.to_owned());
        }
        self.boxes.insert(id.to_owned(), rect);
    }

    pub fn remove(&mut self, id: &str) {
        let Some(old) = self.boxes.remove(id) else {
            return;
        };
        for cell in self.cells_for(old) {
            if let Some(ids) = self.cells.get_mut(&cell) {
                ids.retain(|existing| existing != id);
                if ids.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
    }

    /// Ids whose boxes may be near `rect` (expanded by `pad`), deduplicated,
    /// excluding `exclude`. Order is unspecified.
    pub fn query_near(&self, rect: Rect, pad: f64, exclude: &str) -> Vec<String> {
        let probe = rect.inflate(pad, pad);
        let mut out = Vec::new();
        for cell in self.cells_for(probe) {
            if let Some(ids) = self.cells.get(&cell) {
                for id in ids {
                    if id.as_str() != exclude && !out.contains(id) {
                        out.push(id.clone());
                    }
                }
            }
        }
        out
    }

    fn cells_for(&self, rect: Rect) -> Vec<(i64, i64)> {
        let x0 = (rect.x0 / self.cell_size).floor() as i64;
        let x1 = (rect.x1 / self.cell_size).floor() as i64;
        let y0 = (rect.y0 / self.cell_size).floor() as i64;
        let y1 = (rect.y1 / self.cell_size).floor() as i64;

        let mut cells = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)).max(1) as usize);
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                cells.push((cx, cy));
            }
        }
        cells
    }
}
