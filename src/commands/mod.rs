pub mod detail;
pub mod rank;
pub mod render;
pub mod screen;
