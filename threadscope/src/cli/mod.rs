pub mod args;

pub use args::{parse_frames, Args};
