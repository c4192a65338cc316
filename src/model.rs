pub mod campaign;
pub mod color;
pub mod element;
pub mod template;
