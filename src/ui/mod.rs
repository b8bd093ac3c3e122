//! Terminal output.

mod display;

pub use display::{thousands, BannerInfo, RunDisplay};
