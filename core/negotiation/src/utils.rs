pub mod display;
pub mod lock;
