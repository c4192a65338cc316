//! Snapping, guides, and equal-spacing hints for interactive drags.
//!
//! Gesture state machine: idle -> active (guides computed every move) ->
//! released (guides cleared). Only `lock`-zone matches move geometry;
//! `near`/`far` matches draw guides without moving anything, which keeps
//! weak near-threshold attraction from jittering the drag.

use kurbo::Rect;

use crate::align::grid::SpatialHashGrid;
use crate::foundation::core::Canvas;

#[derive(Clone, Debug)]
pub struct AlignConfig {
    pub snap_threshold: f64,
    /// Canvas boundary candidates (lock zone scaled x1.2).
    pub snap_to_canvas: bool,
    /// Canvas center-line candidates.
    pub snap_to_center: bool,
    /// Sibling edge/center candidates.
    pub snap_to_elements: bool,
    /// Uniform grid lines every `n` px.
    pub grid_size: Option<f64>,
    pub equal_spacing: bool,
    /// Clamp the final box to the canvas after all other adjustments.
    pub prevent_offcanvas: bool,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            snap_threshold: 8.0,
            snap_to_canvas: true,
            snap_to_center: true,
            snap_to_elements: true,
            grid_size: None,
            equal_spacing: true,
            prevent_offcanvas: false,
        }
    }
}

/// Magnetic zone classification. `Lock` snaps; the rest only guide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MagneticZone {
    Lock,
    Near,
    Far,
    None,
}

const BOUNDARY_LOCK_SCALE: f64 = 1.2;

pub fn classify_zone(distance: f64, threshold: f64, is_boundary: bool) -> MagneticZone {
    let lock_radius = if is_boundary {
        threshold * BOUNDARY_LOCK_SCALE
    } else {
        threshold
    };
    let d = distance.abs();
    if d <= lock_radius {
        MagneticZone::Lock
    } else if d <= threshold * 2.0 {
        MagneticZone::Near
    } else if d <= threshold * 3.0 {
        MagneticZone::Far
    } else {
        MagneticZone::None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuideOrientation {
    /// A vertical line at `position` on the x axis.
    Vertical,
    /// A horizontal line at `position` on the y axis.
    Horizontal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuideKind {
    CanvasEdge,
    CanvasCenter,
    ElementEdge,
    ElementCenter,
    Grid,
    EqualSpacing,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Guide {
    pub orientation: GuideOrientation,
    pub position: f64,
    pub kind: GuideKind,
    pub zone: MagneticZone,
}

/// Pixel-distance overlay between the active element and a neighbor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceBadge {
    pub orientation: GuideOrientation,
    /// Gap interval endpoints along the orientation axis.
    pub from: f64,
    pub to: f64,
    pub distance: f64,
}

/// One pointer-move's worth of alignment output.
#[derive(Clone, Debug, Default)]
pub struct AlignOutcome {
    pub rect: Rect,
    pub guides: Vec<Guide>,
    pub badges: Vec<DistanceBadge>,
    pub snapped_x: bool,
    pub snapped_y: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GesturePhase {
    Idle,
    Active,
}

struct CandidateLine {
    position: f64,
    kind: GuideKind,
    is_boundary: bool,
}

/// Per-axis snap decision under consideration.
struct LockMatch {
    delta: f64,
    position: f64,
    kind: GuideKind,
    is_boundary: bool,
    distance: f64,
}

pub struct AlignmentEngine {
    config: AlignConfig,
    canvas: Canvas,
    grid: SpatialHashGrid,
    phase: GesturePhase,
    active_id: Option<String>,
}

impl AlignmentEngine {
    pub fn new(canvas: Canvas, config: AlignConfig) -> Self {
        Self {
            config,
            canvas,
            grid: SpatialHashGrid::default(),
            phase: GesturePhase::Idle,
            active_id: None,
        }
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    pub fn set_canvas(&mut self, canvas: Canvas) {
        self.canvas = canvas;
    }

    /// Keep the advisory grid in step with element geometry.
    pub fn sync_element(&mut self, id: &str, rect: Rect) {
        self.grid.upsert(id, rect);
    }

    pub fn remove_element(&mut self, id: &str) {
        self.grid.remove(id);
    }

    /// idle -> active.
    pub fn begin_gesture(&mut self, id: &str) {
        self.phase = GesturePhase::Active;
        self.active_id = Some(id.to_owned());
    }

    /// active -> released: guides are cleared, grid keeps the final box.
    pub fn end_gesture(&mut self, final_rect: Option<Rect>) {
        if let (Some(id), Some(rect)) = (self.active_id.as_deref(), final_rect) {
            self.grid.upsert(id, rect);
        }
        self.phase = GesturePhase::Idle;
        self.active_id = None;
    }

    pub fn is_active(&self) -> bool {
        self.phase == GesturePhase::Active
    }

    /// Process one pointer move of the active gesture.
    pub fn move_gesture(&mut self, rect: Rect) -> AlignOutcome {
        let Some(active_id) = self.active_id.clone() else {
            return AlignOutcome {
                rect,
                ..AlignOutcome::default()
            };
        };

        let t = self.config.snap_threshold;
        let neighbor_ids = self.grid.query_near(rect, t * 3.0, &active_id);
        let neighbors: Vec<Rect> = neighbor_ids
            .iter()
            .filter_map(|id| self.grid.bounds(id))
            .collect();

        let mut guides = Vec::new();
        let mut out = rect;

        let (dx, snapped_x) = self.snap_axis(Axis::X, rect, &neighbors, &mut guides);
        let (dy, snapped_y) = self.snap_axis(Axis::Y, rect, &neighbors, &mut guides);
        out = out + kurbo::Vec2::new(dx, dy);

        let mut snapped_x = snapped_x;
        let mut snapped_y = snapped_y;
        if self.config.equal_spacing {
            if !snapped_x
                && let Some(adj) = equal_spacing_snap(Axis::X, out, &neighbors, t)
            {
                out = out + kurbo::Vec2::new(adj.delta, 0.0);
                guides.push(Guide {
                    orientation: GuideOrientation::Vertical,
                    position: adj.position,
                    kind: GuideKind::EqualSpacing,
                    zone: MagneticZone::Lock,
                });
                snapped_x = true;
            }
            if !snapped_y
                && let Some(adj) = equal_spacing_snap(Axis::Y, out, &neighbors, t)
            {
                out = out + kurbo::Vec2::new(0.0, adj.delta);
                guides.push(Guide {
                    orientation: GuideOrientation::Horizontal,
                    position: adj.position,
                    kind: GuideKind::EqualSpacing,
                    zone: MagneticZone::Lock,
                });
                snapped_y = true;
            }
        }

        if self.config.prevent_offcanvas {
            out = clamp_to_canvas(out, self.canvas);
        }

        let badges = distance_badges(out, &neighbors);

        // The advisory grid follows the gesture so subsequent queries see
        // fresh geometry.
        self.grid.upsert(&active_id, out);

        AlignOutcome {
            rect: out,
            guides,
            badges,
            snapped_x,
            snapped_y,
        }
    }

    /// Gather candidates and resolve one axis. Returns (delta, locked).
    fn snap_axis(
        &self,
        axis: Axis,
        rect: Rect,
        neighbors: &[Rect],
        guides: &mut Vec<Guide>,
    ) -> (f64, bool) {
        let t = self.config.snap_threshold;
        let candidates = self.candidates(axis, rect, neighbors);
        let own_points = axis.own_points(rect);

        let mut best: Option<LockMatch> = None;
        for candidate in &candidates {
            for &own in &own_points {
                let distance = candidate.position - own;
                let zone = classify_zone(distance, t, candidate.is_boundary);
                match zone {
                    MagneticZone::Lock => {
                        let m = LockMatch {
                            delta: distance,
                            position: candidate.position,
                            kind: candidate.kind,
                            is_boundary: candidate.is_boundary,
                            distance: distance.abs(),
                        };
                        let better = match &best {
                            None => true,
                            // Boundary candidates outrank element/grid ones,
                            // then smallest distance wins.
                            Some(b) => match (m.is_boundary, b.is_boundary) {
                                (true, false) => true,
                                (false, true) => false,
                                _ => m.distance < b.distance,
                            },
                        };
                        if better {
                            best = Some(m);
                        }
                    }
                    MagneticZone::Near | MagneticZone::Far => {
                        guides.push(Guide {
                            orientation: axis.orientation(),
                            position: candidate.position,
                            kind: candidate.kind,
                            zone,
                        });
                    }
                    MagneticZone::None => {}
                }
            }
        }

        match best {
            Some(m) => {
                guides.push(Guide {
                    orientation: axis.orientation(),
                    position: m.position,
                    kind: m.kind,
                    zone: MagneticZone::Lock,
                });
                (m.delta, true)
            }
            None => (0.0, false),
        }
    }

    fn candidates(&self, axis: Axis, rect: Rect, neighbors: &[Rect]) -> Vec<CandidateLine> {
        let mut out = Vec::new();
        let canvas_extent = match axis {
            Axis::X => self.canvas.width as f64,
            Axis::Y => self.canvas.height as f64,
        };

        if self.config.snap_to_canvas {
            out.push(CandidateLine {
                position: 0.0,
                kind: GuideKind::CanvasEdge,
                is_boundary: true,
            });
            out.push(CandidateLine {
                position: canvas_extent,
                kind: GuideKind::CanvasEdge,
                is_boundary: true,
            });
        }
        if self.config.snap_to_center {
            out.push(CandidateLine {
                position: canvas_extent / 2.0,
                kind: GuideKind::CanvasCenter,
                is_boundary: false,
            });
        }
        if self.config.snap_to_elements {
            for n in neighbors {
                let (lo, mid, hi) = axis.points_of(*n);
                out.push(CandidateLine {
                    position: lo,
                    kind: GuideKind::ElementEdge,
                    is_boundary: false,
                });
                out.push(CandidateLine {
                    position: mid,
                    kind: GuideKind::ElementCenter,
                    is_boundary: false,
                });
                out.push(CandidateLine {
                    position: hi,
                    kind: GuideKind::ElementEdge,
                    is_boundary: false,
                });
            }
        }
        if let Some(step) = self.config.grid_size
            && step > 0.0
        {
            for own in axis.own_points(rect) {
                let line = (own / step).round() * step;
                out.push(CandidateLine {
                    position: line,
                    kind: GuideKind::Grid,
                    is_boundary: false,
                });
            }
        }
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

impl Axis {
    fn orientation(self) -> GuideOrientation {
        match self {
            Axis::X => GuideOrientation::Vertical,
            Axis::Y => GuideOrientation::Horizontal,
        }
    }

    /// (low edge, center, high edge) of a rect along this axis.
    fn points_of(self, r: Rect) -> (f64, f64, f64) {
        match self {
            Axis::X => (r.x0, r.center().x, r.x1),
            Axis::Y => (r.y0, r.center().y, r.y1),
        }
    }

    fn own_points(self, r: Rect) -> [f64; 3] {
        let (lo, mid, hi) = self.points_of(r);
        [lo, mid, hi]
    }

    /// Interval of a rect on the *other* axis (for overlap tests).
    fn cross_interval(self, r: Rect) -> (f64, f64) {
        match self {
            Axis::X => (r.y0, r.y1),
            Axis::Y => (r.x0, r.x1),
        }
    }
}

fn intervals_overlap(a: (f64, f64), b: (f64, f64)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

struct SpacingAdjust {
    delta: f64,
    /// Snapped edge position, for the guide line.
    position: f64,
}

/// Reproduce an existing sibling gap: when the active element's prospective
/// gap to its nearest neighbor matches some gap between a sibling pair
/// within the threshold, snap to make the spacing exactly equal.
fn equal_spacing_snap(
    axis: Axis,
    rect: Rect,
    neighbors: &[Rect],
    threshold: f64,
) -> Option<SpacingAdjust> {
    let cross = axis.cross_interval(rect);
    let mut lanes: Vec<Rect> = neighbors
        .iter()
        .copied()
        .filter(|n| intervals_overlap(axis.cross_interval(*n), cross))
        .collect();
    if lanes.len() < 2 {
        return None;
    }
    lanes.sort_by(|a, b| {
        axis.points_of(*a)
            .0
            .partial_cmp(&axis.points_of(*b).0)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Gaps between consecutive sibling pairs.
    let mut pair_gaps = Vec::new();
    for pair in lanes.windows(2) {
        let gap = axis.points_of(pair[1]).0 - axis.points_of(pair[0]).2;
        if gap > 0.0 {
            pair_gaps.push(gap);
        }
    }
    if pair_gaps.is_empty() {
        return None;
    }

    let (own_lo, _, own_hi) = axis.points_of(rect);

    // Nearest neighbor on the low side and the prospective gap to it.
    let left = lanes
        .iter()
        .filter(|n| axis.points_of(**n).2 <= own_lo)
        .max_by(|a, b| {
            axis.points_of(**a)
                .2
                .partial_cmp(&axis.points_of(**b).2)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    if let Some(left) = left {
        let left_hi = axis.points_of(*left).2;
        let prospective = own_lo - left_hi;
        for &gap in &pair_gaps {
            if (prospective - gap).abs() <= threshold {
                return Some(SpacingAdjust {
                    delta: (left_hi + gap) - own_lo,
                    position: left_hi + gap,
                });
            }
        }
    }

    // And the high side.
    let right = lanes
        .iter()
        .filter(|n| axis.points_of(**n).0 >= own_hi)
        .min_by(|a, b| {
            axis.points_of(**a)
                .0
                .partial_cmp(&axis.points_of(**b).0)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    if let Some(right) = right {
        let right_lo = axis.points_of(*right).0;
        let prospective = right_lo - own_hi;
        for &gap in &pair_gaps {
            if (prospective - gap).abs() <= threshold {
                return Some(SpacingAdjust {
                    delta: (right_lo - gap) - own_hi,
                    position: right_lo - gap,
                });
            }
        }
    }

    None
}

fn clamp_to_canvas(rect: Rect, canvas: Canvas) -> Rect {
    let w = rect.width();
    let h = rect.height();
    let max_x = (canvas.width as f64 - w).max(0.0);
    let max_y = (canvas.height as f64 - h).max(0.0);
    let x = rect.x0.clamp(0.0, max_x);
    let y = rect.y0.clamp(0.0, max_y);
    Rect::new(x, y, x + w, y + h)
}

/// Distance overlays to the nearest neighbor on each axis side.
fn distance_badges(rect: Rect, neighbors: &[Rect]) -> Vec<DistanceBadge> {
    let mut badges = Vec::new();

    for axis in [Axis::X, Axis::Y] {
        let cross = axis.cross_interval(rect);
        let (own_lo, _, own_hi) = axis.points_of(rect);

        let mut nearest_low: Option<f64> = None;
        let mut nearest_high: Option<f64> = None;
        for n in neighbors {
            if !intervals_overlap(axis.cross_interval(*n), cross) {
                continue;
            }
            let (n_lo, _, n_hi) = axis.points_of(*n);
            if n_hi <= own_lo {
                nearest_low = Some(nearest_low.map_or(n_hi, |cur: f64| cur.max(n_hi)));
            }
            if n_lo >= own_hi {
                nearest_high = Some(nearest_high.map_or(n_lo, |cur: f64| cur.min(n_lo)));
            }
        }

        if let Some(edge) = nearest_low {
            badges.push(DistanceBadge {
                orientation: axis.orientation(),
                from: edge,
                to: own_lo,
                distance: own_lo - edge,
            });
        }
        if let Some(edge) = nearest_high {
            badges.push(DistanceBadge {
                orientation: axis.orientation(),
                from: own_hi,
                to: edge,
                distance: edge - own_hi,
            });
        }
    }

    badges
}
