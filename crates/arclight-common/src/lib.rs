#![allow(clippy::needless_range_loop, clippy::too_many_arguments, clippy::manual_range_contains)]

pub mod map_source;
pub mod math;
pub mod scene;
pub mod winding;
