//! Differential flame graphs
//!
//! Merges a "before" and an "after" profile into one tree. Each node keeps
//! both inclusive counts. Geometry uses the average of the node's share of
//! each profile's total, which is additive (children never outweigh their
//! parent) and keeps frames that vanished from one side visible. Color
//! encodes the change in share: red grew, blue shrank, gray unchanged.

use std::collections::BTreeMap;
use std::io::Write;

use super::color::{delta_color, NEUTRAL_GRAY};
use super::layout::{compute_layout, LayoutTree};
use super::svg::{percent, write_details, write_footer, write_frame, write_header, SvgOptions};
use crate::aggregation::{FoldedStacks, FrameTree, NodeId, TreeConfig, ROOT_NAME};
use crate::domain::RenderError;

/// Header height leaving room for the legend row
const DIFF_HEADER: u32 = 100;

const LEGEND_Y: u32 = 52;
const IMPROVEMENT_SWATCH: &str = "rgb(100,120,255)";
const REGRESSION_SWATCH: &str = "rgb(255,80,80)";

#[derive(Debug, Clone)]
pub struct DiffNode {
    pub name: String,
    pub before: u64,
    pub after: u64,
    pub depth: usize,
    children: BTreeMap<String, usize>,
}

/// Merged before/after call tree
#[derive(Debug, Clone)]
pub struct DiffTree {
    nodes: Vec<DiffNode>,
    before_total: u64,
    after_total: u64,
    max_depth: usize,
}

impl DiffTree {
    /// Build from two folded profiles
    #[must_use]
    pub fn from_profiles(before: &FoldedStacks, after: &FoldedStacks, config: TreeConfig) -> Self {
        Self::from_trees(&FrameTree::from_folded(before, config), &FrameTree::from_folded(after, config))
    }

    /// Merge two frame trees by child name at every level
    #[must_use]
    pub fn from_trees(before: &FrameTree, after: &FrameTree) -> Self {
        let mut tree = Self {
            nodes: vec![DiffNode {
                name: ROOT_NAME.to_string(),
                before: before.total_samples(),
                after: after.total_samples(),
                depth: 0,
                children: BTreeMap::new(),
            }],
            before_total: before.total_samples(),
            after_total: after.total_samples(),
            max_depth: 0,
        };

        let mut pending: Vec<(usize, Option<NodeId>, Option<NodeId>)> =
            vec![(0, Some(before.root()), Some(after.root()))];

        while let Some((parent, before_id, after_id)) = pending.pop() {
            let mut merged: BTreeMap<&str, (Option<NodeId>, Option<NodeId>)> = BTreeMap::new();
            if let Some(id) = before_id {
                for child in before.node(id).children() {
                    merged.entry(before.node(child).name.as_str()).or_default().0 = Some(child);
                }
            }
            if let Some(id) = after_id {
                for child in after.node(id).children() {
                    merged.entry(after.node(child).name.as_str()).or_default().1 = Some(child);
                }
            }

            let depth = tree.nodes[parent].depth + 1;
            for (name, (b, a)) in merged {
                let id = tree.nodes.len();
                tree.nodes.push(DiffNode {
                    name: name.to_string(),
                    before: b.map_or(0, |b| before.node(b).inclusive),
                    after: a.map_or(0, |a| after.node(a).inclusive),
                    depth,
                    children: BTreeMap::new(),
                });
                tree.nodes[parent].children.insert(name.to_string(), id);
                tree.max_depth = tree.max_depth.max(depth);
                pending.push((id, b, a));
            }
        }

        tree
    }

    #[must_use]
    pub fn before_total(&self) -> u64 {
        self.before_total
    }

    #[must_use]
    pub fn after_total(&self) -> u64 {
        self.after_total
    }

    /// Node reached by following a root-first path of names
    #[must_use]
    pub fn find(&self, path: &[&str]) -> Option<&DiffNode> {
        let mut current = 0;
        for name in path {
            current = *self.nodes[current].children.get(*name)?;
        }
        Some(&self.nodes[current])
    }

    /// Fraction of each profile's samples inside `node`
    #[allow(clippy::cast_precision_loss)]
    fn rates(&self, node: &DiffNode) -> (f64, f64) {
        let rate = |count: u64, total: u64| if total == 0 { 0.0 } else { count as f64 / total as f64 };
        (rate(node.before, self.before_total), rate(node.after, self.after_total))
    }
}

impl LayoutTree for DiffTree {
    type Id = usize;

    fn root(&self) -> usize {
        0
    }

    fn weight(&self, id: usize) -> f64 {
        let (before, after) = self.rates(&self.nodes[id]);
        (before + after) / 2.0
    }

    fn name(&self, id: usize) -> &str {
        &self.nodes[id].name
    }

    fn children(&self, id: usize) -> Vec<usize> {
        self.nodes[id].children.values().copied().collect()
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Render a differential flame graph
///
/// # Errors
/// - [`RenderError::NoSamples`] if either profile is empty
/// - [`RenderError::InvalidWidth`] for a canvas narrower than its margins
/// - [`RenderError::Io`] if writing fails
pub fn render_diff<W: Write>(tree: &DiffTree, options: &SvgOptions, mut out: W) -> Result<(), RenderError> {
    if tree.before_total == 0 || tree.after_total == 0 {
        return Err(RenderError::NoSamples);
    }

    let mut config = options.layout.clone();
    config.header = config.header.max(DIFF_HEADER);
    let layout = compute_layout(tree, &config)?;

    let subtitle = format!(
        "Before: {} samples, After: {} samples. Ctrl+F to search.",
        tree.before_total, tree.after_total
    );
    write_header(&mut out, &layout, &options.title, &subtitle)?;
    write_legend(&mut out, layout.width / 2)?;
    write_details(&mut out, &layout)?;

    for rect in &layout.rects {
        let node = &tree.nodes[rect.id];
        let (before_rate, after_rate) = tree.rates(node);
        let fill = if rect.depth == 0 { NEUTRAL_GRAY } else { delta_color(before_rate, after_rate) };

        let before_pct = percent(node.before, tree.before_total);
        let after_pct = percent(node.after, tree.after_total);
        let delta = after_pct - before_pct;
        let sign = if delta >= 0.0 { "+" } else { "" };
        let tooltip = format!(
            "{} (before: {} [{before_pct:.1}%], after: {} [{after_pct:.1}%], delta: {sign}{delta:.1}%)",
            node.name, node.before, node.after
        );
        write_frame(&mut out, rect, &node.name, &tooltip, fill, &config)?;
    }

    write_footer(&mut out)
}

/// [`render_diff`] into a string
///
/// # Errors
/// As [`render_diff`].
pub fn render_diff_to_string(tree: &DiffTree, options: &SvgOptions) -> Result<String, RenderError> {
    let mut buffer = Vec::new();
    render_diff(tree, options, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn write_legend<W: Write>(out: &mut W, center: u32) -> Result<(), RenderError> {
    let swatch_y = LEGEND_Y - 10;
    let left = center.saturating_sub(160);
    writeln!(
        out,
        r#"<rect x="{left}" y="{swatch_y}" width="16" height="12" fill="{IMPROVEMENT_SWATCH}" rx="2" />"#
    )?;
    writeln!(
        out,
        r##"<text x="{}" y="{LEGEND_Y}" font-size="11" font-family="sans-serif" fill="#333">Improvement (less CPU)</text>"##,
        left + 20
    )?;
    writeln!(
        out,
        r#"<rect x="{}" y="{swatch_y}" width="16" height="12" fill="{REGRESSION_SWATCH}" rx="2" />"#,
        center + 40
    )?;
    writeln!(
        out,
        r##"<text x="{}" y="{LEGEND_Y}" font-size="11" font-family="sans-serif" fill="#333">Regression (more CPU)</text>"##,
        center + 60
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(before: &str, after: &str) -> DiffTree {
        DiffTree::from_profiles(
            &FoldedStacks::parse_str(before),
            &FoldedStacks::parse_str(after),
            TreeConfig::default(),
        )
    }

    #[test]
    fn test_merged_counts() {
        let tree = diff("main;a 3\nmain;b 1\n", "main;a 1\nmain;c 1\n");
        assert_eq!((tree.before_total(), tree.after_total()), (4, 2));

        let node = |path: &[&str]| tree.find(path).map(|n| (n.before, n.after));
        assert_eq!(node(&["main"]), Some((4, 2)));
        assert_eq!(node(&["main", "a"]), Some((3, 1)));
        assert_eq!(node(&["main", "b"]), Some((1, 0)));
        assert_eq!(node(&["main", "c"]), Some((0, 1)));
    }

    #[test]
    fn test_weights_are_additive() {
        let tree = diff("main;a 3\nmain;b 1\n", "main;a 1\nmain;c 1\n");
        let main = tree.children(tree.root())[0];
        let sum: f64 = tree.children(main).iter().map(|&c| tree.weight(c)).sum();
        assert!((sum - tree.weight(main)).abs() < 1e-12);
        assert!((tree.weight(tree.root()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tooltips_and_colors() {
        let tree = diff("main;a 3\nmain;b 1\n", "main;a 1\nmain;c 1\n");
        let svg = render_diff_to_string(&tree, &SvgOptions::default()).expect("render");

        assert!(svg.contains("Before: 4 samples, After: 2 samples."));
        assert!(svg.contains("<title>a (before: 3 [75.0%], after: 1 [50.0%], delta: -25.0%)</title>"));
        assert!(svg.contains("<title>c (before: 0 [0.0%], after: 1 [50.0%], delta: +50.0%)</title>"));
        assert!(svg.contains("<title>main (before: 4 [100.0%], after: 2 [100.0%], delta: +0.0%)</title>"));
        assert!(svg.contains("Improvement (less CPU)"));
        assert!(svg.contains("Regression (more CPU)"));
        // c went from 0% to 50%: full-intensity red
        assert!(svg.contains(r#"fill="rgb(255,60,60)""#));
    }

    #[test]
    fn test_empty_side_is_no_samples() {
        let tree = diff("main 1\n", "# nothing\n");
        let result = render_diff_to_string(&tree, &SvgOptions::default());
        assert!(matches!(result, Err(RenderError::NoSamples)));
    }
}
