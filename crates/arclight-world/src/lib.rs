// arclight-world: areas, portals, scene defs, interactions, tracing

#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::manual_range_contains)]

pub mod decals;
pub mod defs;
pub mod demo;
pub mod handles;
pub mod interactions;
pub mod light_queries;
pub mod models;
pub mod portals;
pub mod trace;
pub mod world;

#[cfg(test)]
mod test_support;
