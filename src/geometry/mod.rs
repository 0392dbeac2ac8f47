pub mod position;
pub mod rect;
