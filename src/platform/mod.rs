mod runtime;

pub use runtime::{sleep, spawn_detached};
