//! # Layout & Rendering
//!
//! Turns a finished [`FrameTree`](crate::aggregation::FrameTree) into an
//! interactive SVG flame graph.
//!
//! - **`layout`**: pure geometry ([`compute_layout`]) over any
//!   [`LayoutTree`], plus label fitting
//! - **`color`**: deterministic per-name warm colors and diff colors
//! - **`svg`**: the document writer ([`render_flamegraph`])
//! - **`diff`**: before/after comparison ([`DiffTree`], [`render_diff`])
//!
//! Rendering is a batch pass over a complete tree. An empty profile is
//! [`RenderError::NoSamples`](crate::domain::RenderError::NoSamples), never
//! a blank image.

pub mod color;
pub mod diff;
pub mod layout;
pub mod svg;

pub use color::{delta_color, name_hash, warm_color, Rgb};
pub use diff::{render_diff, render_diff_to_string, DiffTree};
pub use layout::{compute_layout, fit_label, FrameRect, Layout, LayoutConfig, LayoutTree};
pub use svg::{escape_xml, render_flamegraph, render_flamegraph_to_string, SvgOptions};
