pub mod json;

pub use json::{json_eval, json_eval_value, stringify};
