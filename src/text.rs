pub mod autofit;
pub mod fonts;
pub mod layout;
