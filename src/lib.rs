//! Terrain-aware glide reachability.
//!
//! Computes the set of ground cells a paraglider can reach in a straight or
//! kinked glide from a launch point, given glide performance and wind, with
//! line-of-sight checks against SRTM elevation data. The search core is
//! synchronous; the optional web layer in [`web`] serves it over HTTP.

pub mod contour;
pub mod glide;
pub mod grid;
pub mod hgt;
pub mod pqueue;
pub mod render;
pub mod search;
pub mod tiles;
pub mod web;

pub use grid::HeightGrid;
pub use search::{
    GlideQuery, GridIndex, Node, SearchConfig, SearchState, path, path_length, search,
    search_from_point,
};
pub use tiles::TileStore;
