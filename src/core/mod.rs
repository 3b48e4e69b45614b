pub mod frame;
pub mod fset;
pub mod physics;
pub mod random;
