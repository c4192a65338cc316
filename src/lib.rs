//! Pinpress is a template rendering and batch pin generation engine.
//!
//! A [`Template`] describes a fixed canvas of typed elements (text, image,
//! shape, frame); a [`Campaign`] pairs templates with a data table and
//! produces one rendered pin per row. Two execution targets consume the same
//! element model and must stay visually identical:
//!
//! - the interactive [`SceneAdapter`](scene::adapter::SceneAdapter), a live
//!   mutable scene graph bound to a canvas backend, with snapping and
//!   debounced repaints for editing;
//! - the headless [`PinRenderer`](render::headless::PinRenderer), a
//!   stateless per-row painter driven at volume by the
//!   [`BatchPipeline`](batch::pipeline::BatchPipeline) with distributed
//!   progress counters and advisory run locks.
//!
//! Parity holds by construction: paint order, placement transforms, field
//! substitution, fit-mode math, and wrap policy live in shared code used by
//! both targets.
#![forbid(unsafe_code)]

pub mod align;
pub mod batch;
pub mod foundation;
pub mod model;
pub mod render;
pub mod resolve;
pub mod scene;
pub mod store;
pub mod text;

pub use foundation::core::{Canvas, Rgba8Premul};
pub use foundation::error::{PinError, PinResult};

pub use model::campaign::{
    Campaign, CampaignStatus, DataRow, FieldMapping, PinImage, RenderResult, RowOutcome,
};
pub use model::color::ColorDef;
pub use model::element::{Element, ElementKind, FitMode};
pub use model::template::Template;

pub use batch::pipeline::{BatchOptions, BatchPipeline, BatchReport, BatchRunStatus, PauseSignal};
pub use render::headless::{PinRenderer, RendererConfig};
pub use store::kv::{KvStore, MemoryStore};
pub use store::sink::{DirPinSink, MemorySink, PinSink, ProgressSnapshot};
