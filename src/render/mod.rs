pub mod bars;
pub mod compose;
pub mod frame;
pub mod overlay;
