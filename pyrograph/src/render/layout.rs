//! Flame graph geometry
//!
//! ## Rules
//!
//! - The root spans the canvas width minus the side margins, on the bottom row
//! - A child's width is `parent_width * child_weight / parent_weight`
//! - Children are placed left to right in name order starting at the
//!   parent's left edge, so their widths sum to the parent's width
//! - A frame narrower than `min_width` is not emitted, and neither are its
//!   descendants (their weight still counts toward the ancestors)
//! - Row `depth` sits at `height - bottom_margin - (depth + 1) * row_height`
//!
//! Layout is generic over [`LayoutTree`] so the plain and differential
//! renderers share it.

use std::borrow::Cow;

use crate::aggregation::{FrameTree, NodeId};
use crate::domain::RenderError;

/// Canvas geometry and text metrics
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    /// Canvas width in pixels
    pub width: u32,
    pub row_height: u32,
    pub font_size: u32,
    /// Narrowest frame still drawn
    pub min_width: f64,
    /// Estimated width of one monospace character
    pub char_width: f64,
    pub side_margin: f64,
    pub bottom_margin: f64,
    /// Space above the frames for title and subtitle
    pub header: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            row_height: 16,
            font_size: 11,
            min_width: 0.1,
            char_width: 6.5,
            side_margin: 10.0,
            bottom_margin: 30.0,
            header: 60,
        }
    }
}

impl LayoutConfig {
    #[must_use]
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }
}

/// A weighted tree that can be laid out as a flame graph
pub trait LayoutTree {
    type Id: Copy;

    fn root(&self) -> Self::Id;

    /// Horizontal weight of a node (inclusive samples or a share)
    fn weight(&self, id: Self::Id) -> f64;

    fn name(&self, id: Self::Id) -> &str;

    /// Children in left-to-right order (sorted by name)
    fn children(&self, id: Self::Id) -> Vec<Self::Id>;

    /// Depth of the deepest node
    fn max_depth(&self) -> usize;
}

/// One visible frame rectangle
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRect<Id> {
    pub id: Id,
    pub depth: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
}

/// All visible frames, parents before children, left to right
#[derive(Debug, Clone)]
pub struct Layout<Id> {
    pub width: u32,
    pub height: u32,
    pub rects: Vec<FrameRect<Id>>,
}

/// Compute frame rectangles for `tree`
///
/// # Errors
/// - [`RenderError::NoSamples`] if the root has no weight
/// - [`RenderError::InvalidWidth`] if the canvas is not wider than its margins
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn compute_layout<T: LayoutTree>(tree: &T, config: &LayoutConfig) -> Result<Layout<T::Id>, RenderError> {
    let root = tree.root();
    if tree.weight(root) <= 0.0 {
        return Err(RenderError::NoSamples);
    }
    let usable = f64::from(config.width) - 2.0 * config.side_margin;
    if usable <= 0.0 {
        return Err(RenderError::InvalidWidth(config.width));
    }

    let rows = tree.max_depth() as u32 + 2;
    let height = rows * config.row_height + config.header;
    let row_height = f64::from(config.row_height);
    let bottom = f64::from(height) - config.bottom_margin;

    let mut rects = Vec::new();
    let mut pending = vec![(root, 0usize, config.side_margin, usable)];

    while let Some((id, depth, x, width)) = pending.pop() {
        if width < config.min_width {
            continue;
        }
        rects.push(FrameRect { id, depth, x, y: bottom - (depth + 1) as f64 * row_height, width });

        let weight = tree.weight(id);
        if weight <= 0.0 {
            continue;
        }

        let mut child_x = x;
        let mut placed = Vec::new();
        for child in tree.children(id) {
            let child_width = width * (tree.weight(child) / weight);
            placed.push((child, depth + 1, child_x, child_width));
            child_x += child_width;
        }
        // Reversed so the leftmost child is emitted first
        pending.extend(placed.into_iter().rev());
    }

    Ok(Layout { width: config.width, height, rects })
}

/// Label text for a frame of `width` pixels
///
/// Full name if it fits, a prefix followed by `..` if the frame is wider
/// than 20 px, otherwise nothing.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn fit_label<'a>(name: &'a str, width: f64, config: &LayoutConfig) -> Option<Cow<'a, str>> {
    let chars = name.chars().count();
    if width > chars as f64 * config.char_width + 6.0 {
        return Some(Cow::Borrowed(name));
    }
    if width <= 20.0 {
        return None;
    }

    let max_chars = ((width - 6.0) / config.char_width) as usize;
    if max_chars == 0 {
        return None;
    }
    let prefix: String = name.chars().take(max_chars).collect();
    Some(Cow::Owned(format!("{prefix}..")))
}

impl LayoutTree for FrameTree {
    type Id = NodeId;

    fn root(&self) -> NodeId {
        FrameTree::root(self)
    }

    #[allow(clippy::cast_precision_loss)]
    fn weight(&self, id: NodeId) -> f64 {
        self.node(id).inclusive as f64
    }

    fn name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).children().collect()
    }

    fn max_depth(&self) -> usize {
        FrameTree::max_depth(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{FoldedStacks, TreeConfig};

    fn tree(text: &str) -> FrameTree {
        FrameTree::from_folded(&FoldedStacks::parse_str(text), TreeConfig::default())
    }

    #[test]
    fn test_root_spans_usable_width_on_bottom_row() {
        let tree = tree("a;b 1\n");
        let config = LayoutConfig::default();
        let layout = compute_layout(&tree, &config).expect("layout");

        let root = &layout.rects[0];
        assert_eq!(root.depth, 0);
        assert!((root.x - 10.0).abs() < f64::EPSILON);
        assert!((root.width - 1180.0).abs() < f64::EPSILON);
        // max depth 2 → (2 + 2) * 16 + 60
        assert_eq!(layout.height, 124);
        assert!((root.y - (124.0 - 30.0 - 16.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_children_split_parent_width_in_name_order() {
        let tree = tree("main;b 3\nmain;a 1\n");
        let layout = compute_layout(&tree, &LayoutConfig::default()).expect("layout");

        let names: Vec<&str> = layout.rects.iter().map(|r| tree.node(r.id).name.as_str()).collect();
        assert_eq!(names, vec!["root", "main", "a", "b"]);

        let (main, a, b) = (&layout.rects[1], &layout.rects[2], &layout.rects[3]);
        assert!((a.x - main.x).abs() < 1e-9);
        assert!((a.width - main.width * 0.25).abs() < 1e-9);
        assert!((a.width + b.width - main.width).abs() < 1e-9);
        assert!((b.x - (a.x + a.width)).abs() < 1e-9);
    }

    #[test]
    fn test_narrow_frames_are_not_emitted() {
        // "tiny" gets 1180 / 100000 px, below the 0.1 px threshold
        let tree = tree("main;big 99999\nmain;tiny;deeper 1\n");
        let layout = compute_layout(&tree, &LayoutConfig::default()).expect("layout");

        let names: Vec<&str> = layout.rects.iter().map(|r| tree.node(r.id).name.as_str()).collect();
        assert_eq!(names, vec!["root", "main", "big"]);
    }

    #[test]
    fn test_empty_tree_is_no_samples() {
        let result = compute_layout(&FrameTree::default(), &LayoutConfig::default());
        assert!(matches!(result, Err(RenderError::NoSamples)));
    }

    #[test]
    fn test_width_must_exceed_margins() {
        let tree = tree("a 1\n");
        let result = compute_layout(&tree, &LayoutConfig::default().with_width(20));
        assert!(matches!(result, Err(RenderError::InvalidWidth(20))));
    }

    #[test]
    fn test_fit_label_rules() {
        let config = LayoutConfig::default();
        // "compute" is 7 chars → needs > 51.5 px
        assert_eq!(fit_label("compute", 52.0, &config).as_deref(), Some("compute"));
        // (30 - 6) / 6.5 = 3.69 → 3 chars
        assert_eq!(fit_label("compute", 30.0, &config).as_deref(), Some("com.."));
        assert_eq!(fit_label("compute", 20.0, &config), None);
    }
}
