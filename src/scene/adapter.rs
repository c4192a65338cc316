//! Live mutable scene graph bound to a canvas backend.
//!
//! Single-threaded cooperative: one scene mutation at a time, driven by UI
//! event callbacks. Rendering of the visible frame is debounced through
//! [`RepaintScheduler`] so rapid successive mutations coalesce into one
//! repaint.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use kurbo::Rect;

use crate::align::engine::{AlignConfig, AlignOutcome, AlignmentEngine};
use crate::foundation::core::Canvas;
use crate::foundation::error::{PinError, PinResult};
use crate::model::element::{Element, ElementKind};
use crate::model::template::Template;
use crate::scene::backend::{CanvasBackend, NodeId, ScenePrimitive};
use crate::scene::scheduler::RepaintScheduler;

/// Change notification emitted after every scene mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    TemplateLoaded,
    ElementAdded { id: String },
    ElementUpdated { id: String },
    ElementRemoved { id: String },
    OrderChanged,
    ImageStateChanged { id: String, state: ImageLoadState },
}

/// Async image lifecycle per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLoadState {
    Placeholder,
    Loading,
    Resolved,
    Failed,
}

/// Handle for an in-flight image load. Completion is gated on the element
/// still being the current occupant of its id slot; a stale ticket (element
/// removed or reloaded since) is ignored rather than resurrecting anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    element_id: String,
    generation: u64,
}

/// Partial element update. Unset fields leave the element untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
    pub opacity: Option<f64>,
    pub visible: Option<bool>,
    pub locked: Option<bool>,
    pub z_index: Option<i32>,
    /// Text elements only.
    pub text: Option<String>,
    /// Image elements only.
    pub source: Option<String>,
}

type Listener = Box<dyn FnMut(&SceneEvent)>;

/// Owns the interactive scene graph and keeps the backend display list in
/// sync with it.
pub struct SceneAdapter<B: CanvasBackend> {
    backend: B,
    canvas: Canvas,
    elements: Vec<Element>,
    nodes: HashMap<String, NodeId>,
    generations: HashMap<String, u64>,
    image_states: HashMap<String, ImageLoadState>,
    scheduler: RepaintScheduler,
    align: AlignmentEngine,
    dragging: Option<String>,
    listeners: Vec<Listener>,
    next_generation: u64,
    destroyed: bool,
}

impl<B: CanvasBackend> SceneAdapter<B> {
    pub fn new(backend: B, canvas: Canvas, frame_budget: Duration) -> Self {
        Self {
            backend,
            canvas,
            elements: Vec::new(),
            nodes: HashMap::new(),
            generations: HashMap::new(),
            image_states: HashMap::new(),
            scheduler: RepaintScheduler::new(frame_budget),
            align: AlignmentEngine::new(canvas, AlignConfig::default()),
            dragging: None,
            listeners: Vec::new(),
            next_generation: 1,
            destroyed: false,
        }
    }

    /// Replace the snapping configuration; the spatial grid is rebuilt from
    /// current element geometry.
    pub fn set_align_config(&mut self, config: AlignConfig) {
        self.align = AlignmentEngine::new(self.canvas, config);
        for el in &self.elements {
            if el.visible && el.hit_testable() {
                self.align.sync_element(&el.id, el.bounds());
            }
        }
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|el| el.id == id)
    }

    pub fn image_state(&self, id: &str) -> Option<ImageLoadState> {
        self.image_states.get(id).copied()
    }

    /// Subscribe to change events.
    pub fn on_change(&mut self, listener: impl FnMut(&SceneEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Replace the whole scene with a template's element list.
    pub fn load_template(&mut self, template: &Template, now: Instant) -> PinResult<()> {
        template.validate()?;

        self.backend.clear();
        self.nodes.clear();
        self.image_states.clear();
        self.elements = template.elements.clone();
        self.canvas = template.canvas();
        self.align.set_canvas(self.canvas);
        self.dragging = None;

        for el in &self.elements {
            let generation = self.next_generation;
            self.next_generation += 1;
            self.generations.insert(el.id.clone(), generation);
            if matches!(el.kind, ElementKind::Image(_)) {
                self.image_states
                    .insert(el.id.clone(), ImageLoadState::Placeholder);
            }
        }

        let order = sorted_visible(&self.elements);
        for idx in &order {
            let el = &self.elements[*idx];
            let node = self.backend.add(&ScenePrimitive::of(el))?;
            self.nodes.insert(el.id.clone(), node);
        }
        self.sync_order()?;
        self.resync_align_grid();

        self.emit(SceneEvent::TemplateLoaded);
        self.request_repaint(now);
        Ok(())
    }

    pub fn add_element(&mut self, element: Element, now: Instant) -> PinResult<()> {
        if element.id.is_empty() {
            return Err(PinError::validation("element id must be non-empty"));
        }
        if self.element(&element.id).is_some() {
            return Err(PinError::validation(format!(
                "element id '{}' already exists",
                element.id
            )));
        }

        let id = element.id.clone();
        let generation = self.next_generation;
        self.next_generation += 1;
        self.generations.insert(id.clone(), generation);
        if matches!(element.kind, ElementKind::Image(_)) {
            self.image_states
                .insert(id.clone(), ImageLoadState::Placeholder);
        }

        if element.visible {
            let node = self.backend.add(&ScenePrimitive::of(&element))?;
            self.nodes.insert(id.clone(), node);
        }
        if element.visible && element.hit_testable() {
            self.align.sync_element(&id, element.bounds());
        }
        self.elements.push(element);
        self.sync_order()?;

        self.emit(SceneEvent::ElementAdded { id });
        self.request_repaint(now);
        Ok(())
    }

    pub fn update_element(
        &mut self,
        id: &str,
        patch: &ElementPatch,
        now: Instant,
    ) -> PinResult<()> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| PinError::validation(format!("unknown element '{id}'")))?;

        let z_changed;
        {
            let el = &mut self.elements[idx];
            z_changed = patch.z_index.is_some_and(|z| z != el.z_index);
            apply_patch(el, patch);
        }

        self.sync_element(idx)?;
        if z_changed {
            self.sync_order()?;
            self.emit(SceneEvent::OrderChanged);
        }

        let el = &self.elements[idx];
        if el.visible && el.hit_testable() {
            self.align.sync_element(id, el.bounds());
        } else {
            self.align.remove_element(id);
        }

        self.emit(SceneEvent::ElementUpdated { id: id.to_owned() });
        self.request_repaint(now);
        Ok(())
    }

    pub fn remove_element(&mut self, id: &str, now: Instant) -> PinResult<()> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| PinError::validation(format!("unknown element '{id}'")))?;

        if let Some(node) = self.nodes.remove(id) {
            self.backend.remove(node)?;
        }
        self.elements.remove(idx);
        self.generations.remove(id);
        self.image_states.remove(id);
        self.align.remove_element(id);
        if self.dragging.as_deref() == Some(id) {
            self.align.end_gesture(None);
            self.dragging = None;
        }

        self.emit(SceneEvent::ElementRemoved { id: id.to_owned() });
        self.request_repaint(now);
        Ok(())
    }

    pub fn set_z_index(&mut self, id: &str, z_index: i32, now: Instant) -> PinResult<()> {
        self.update_element(
            id,
            &ElementPatch {
                z_index: Some(z_index),
                ..ElementPatch::default()
            },
            now,
        )
    }

    // -- drag gestures ------------------------------------------------------

    /// Start a drag gesture on an element. Locked elements and frames do not
    /// drag.
    pub fn begin_drag(&mut self, id: &str) -> PinResult<()> {
        let el = self
            .element(id)
            .ok_or_else(|| PinError::validation(format!("unknown element '{id}'")))?;
        if el.locked {
            return Err(PinError::validation(format!("element '{id}' is locked")));
        }
        if !el.hit_testable() {
            return Err(PinError::validation(format!(
                "element '{id}' is not draggable"
            )));
        }
        self.dragging = Some(id.to_owned());
        self.align.begin_gesture(id);
        Ok(())
    }

    /// One pointer move of the active drag: the alignment engine snaps or
    /// guides, and the (possibly adjusted) position is applied to the scene.
    pub fn drag_to(&mut self, x: f64, y: f64, now: Instant) -> PinResult<AlignOutcome> {
        let id = self
            .dragging
            .clone()
            .ok_or_else(|| PinError::validation("no active drag gesture"))?;
        let (width, height) = self
            .element(&id)
            .map(|el| (el.width, el.height))
            .ok_or_else(|| PinError::validation(format!("unknown element '{id}'")))?;

        let proposed = Rect::new(x, y, x + width, y + height);
        let outcome = self.align.move_gesture(proposed);

        self.update_element(
            &id,
            &ElementPatch {
                x: Some(outcome.rect.x0),
                y: Some(outcome.rect.y0),
                ..ElementPatch::default()
            },
            now,
        )?;
        Ok(outcome)
    }

    /// Finish the active drag; guides clear and the grid keeps the final box.
    pub fn end_drag(&mut self) {
        if let Some(id) = self.dragging.take() {
            let final_rect = self.element(&id).map(Element::bounds);
            self.align.end_gesture(final_rect);
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.is_some()
    }

    // -- async image loading ------------------------------------------------

    /// Mark an image element as loading and get the completion ticket.
    pub fn begin_image_load(&mut self, id: &str) -> PinResult<LoadTicket> {
        let el = self
            .element(id)
            .ok_or_else(|| PinError::validation(format!("unknown element '{id}'")))?;
        if !matches!(el.kind, ElementKind::Image(_)) {
            return Err(PinError::validation(format!(
                "element '{id}' is not an image"
            )));
        }

        let generation = *self
            .generations
            .get(id)
            .expect("tracked element has a generation");
        self.set_image_state(id, ImageLoadState::Loading);
        Ok(LoadTicket {
            element_id: id.to_owned(),
            generation,
        })
    }

    /// Apply a finished load. Returns `false` (and changes nothing) when the
    /// ticket is stale: the element was removed, or its slot was reloaded
    /// with a new occupant since the load started.
    pub fn complete_image_load(
        &mut self,
        ticket: &LoadTicket,
        result: Result<String, String>,
        now: Instant,
    ) -> PinResult<bool> {
        let current = self.generations.get(&ticket.element_id).copied();
        if current != Some(ticket.generation) {
            tracing::debug!(element = %ticket.element_id, "stale image load ignored");
            return Ok(false);
        }
        let Some(idx) = self.index_of(&ticket.element_id) else {
            return Ok(false);
        };

        match result {
            Ok(source) => {
                if let ElementKind::Image(p) = &mut self.elements[idx].kind {
                    p.source = source;
                }
                self.set_image_state(&ticket.element_id, ImageLoadState::Resolved);
            }
            Err(reason) => {
                tracing::warn!(element = %ticket.element_id, reason, "image load failed");
                self.set_image_state(&ticket.element_id, ImageLoadState::Failed);
            }
        }

        self.sync_element(idx)?;
        self.request_repaint(now);
        Ok(true)
    }

    // -- repaint ------------------------------------------------------------

    /// Advance the adapter's clock; forwards at most one coalesced repaint
    /// per frame budget to the backend.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.scheduler.fire_due(now) {
            self.backend.request_repaint();
            return true;
        }
        false
    }

    /// Tear down: cancel any pending repaint and drop all display nodes.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.scheduler.cancel();
        self.backend.clear();
        self.nodes.clear();
    }

    // -- internals ----------------------------------------------------------

    fn index_of(&self, id: &str) -> Option<usize> {
        self.elements.iter().position(|el| el.id == id)
    }

    fn request_repaint(&mut self, now: Instant) {
        self.scheduler.request(now);
    }

    fn sync_element(&mut self, idx: usize) -> PinResult<()> {
        let el = &self.elements[idx];
        match (self.nodes.get(&el.id).copied(), el.visible) {
            (Some(node), true) => self.backend.update(node, &ScenePrimitive::of(el))?,
            (Some(node), false) => {
                self.backend.remove(node)?;
                self.nodes.remove(&el.id);
            }
            (None, true) => {
                let node = self.backend.add(&ScenePrimitive::of(el))?;
                self.nodes.insert(el.id.clone(), node);
                self.sync_order()?;
            }
            (None, false) => {}
        }
        Ok(())
    }

    fn sync_order(&mut self) -> PinResult<()> {
        let order = sorted_visible(&self.elements);
        let nodes: Vec<NodeId> = order
            .iter()
            .filter_map(|&i| self.nodes.get(&self.elements[i].id).copied())
            .collect();
        self.backend.set_order(&nodes)
    }

    fn resync_align_grid(&mut self) {
        for el in &self.elements {
            if el.visible && el.hit_testable() {
                self.align.sync_element(&el.id, el.bounds());
            } else {
                self.align.remove_element(&el.id);
            }
        }
    }

    fn set_image_state(&mut self, id: &str, state: ImageLoadState) {
        self.image_states.insert(id.to_owned(), state);
        self.emit(SceneEvent::ImageStateChanged {
            id: id.to_owned(),
            state,
        });
    }

    fn emit(&mut self, event: SceneEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

impl<B: CanvasBackend> Drop for SceneAdapter<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Visible element indices in paint order; identical sort rule to the
/// headless renderer's `Template::paint_order`.
fn sorted_visible(elements: &[Element]) -> Vec<usize> {
    let mut order: Vec<usize> = elements
        .iter()
        .enumerate()
        .filter(|(_, el)| el.visible)
        .map(|(i, _)| i)
        .collect();
    order.sort_by_key(|&i| (elements[i].z_index, i));
    order
}

fn apply_patch(el: &mut Element, patch: &ElementPatch) {
    if let Some(x) = patch.x {
        el.x = x;
    }
    if let Some(y) = patch.y {
        el.y = y;
    }
    if let Some(w) = patch.width {
        el.width = w;
    }
    if let Some(h) = patch.height {
        el.height = h;
    }
    if let Some(r) = patch.rotation {
        el.rotation = r;
    }
    if let Some(o) = patch.opacity {
        el.opacity = o.clamp(0.0, 1.0);
    }
    if let Some(v) = patch.visible {
        el.visible = v;
    }
    if let Some(l) = patch.locked {
        el.locked = l;
    }
    if let Some(z) = patch.z_index {
        el.z_index = z;
    }
    if let Some(text) = &patch.text
        && let ElementKind::Text(t) = &mut el.kind
    {
        t.text = text.clone();
    }
    if let Some(source) = &patch.source
        && let ElementKind::Image(p) = &mut el.kind
    {
        p.source = source.clone();
    }
}
