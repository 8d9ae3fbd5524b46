pub mod locks;
pub mod undo;
