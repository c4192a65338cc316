//! Canvas-library binding consumed by the interactive adapter.
//!
//! The adapter owns the scene graph; the backend only mirrors it as display
//! primitives and schedules repaints. Implementations wrap whatever canvas
//! library hosts the editor; tests use a recording double.

use crate::foundation::error::PinResult;
use crate::model::element::Element;

/// Backend handle for one displayed primitive.
pub type NodeId = u64;

/// One element as the canvas should currently display it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePrimitive {
    pub element_id: String,
    pub z_index: i32,
    pub element: Element,
}

impl ScenePrimitive {
    pub fn of(element: &Element) -> Self {
        Self {
            element_id: element.id.clone(),
            z_index: element.z_index,
            element: element.clone(),
        }
    }
}

/// Drawing-surface operations the adapter needs.
pub trait CanvasBackend {
    fn add(&mut self, primitive: &ScenePrimitive) -> PinResult<NodeId>;
    fn update(&mut self, node: NodeId, primitive: &ScenePrimitive) -> PinResult<()>;
    fn remove(&mut self, node: NodeId) -> PinResult<()>;
    /// Full stacking order, bottom to top.
    fn set_order(&mut self, bottom_to_top: &[NodeId]) -> PinResult<()>;
    /// Ask the host to repaint the visible frame. Debounced by the adapter.
    fn request_repaint(&mut self);
    /// Drop every primitive (adapter teardown or template reload).
    fn clear(&mut self);
}
