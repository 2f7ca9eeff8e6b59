use pyrograph::aggregation::{FoldedStacks, FrameTree, TreeConfig};
use pyrograph::domain::RenderError;
use pyrograph::render::{
    compute_layout, render_diff_to_string, render_flamegraph_to_string, warm_color, DiffTree, LayoutConfig,
    LayoutTree, SvgOptions,
};

const PROFILE: &str = "\
main;parse;lex 40
main;parse;ast 25
main;render;layout 20
main;render;paint 10
main;io 5
";

fn tree(text: &str) -> FrameTree {
    FrameTree::from_folded(&FoldedStacks::parse_str(text), TreeConfig::default())
}

#[test]
fn test_render_is_idempotent() {
    let tree = tree(PROFILE);
    let options = SvgOptions::default();
    let first = render_flamegraph_to_string(&tree, &options).expect("render");
    let second = render_flamegraph_to_string(&tree, &options).expect("render");
    assert_eq!(first, second);

    // Independently built trees render identically too
    let rebuilt = self::tree(PROFILE);
    assert_eq!(first, render_flamegraph_to_string(&rebuilt, &options).expect("render"));
}

#[test]
fn test_child_widths_sum_to_parent() {
    let tree = tree(PROFILE);
    let layout = compute_layout(&tree, &LayoutConfig::default().with_width(900)).expect("layout");

    for parent in &layout.rects {
        let children: Vec<_> = layout
            .rects
            .iter()
            .filter(|r| r.depth == parent.depth + 1 && r.x >= parent.x - 1e-9 && r.x < parent.x + parent.width)
            .collect();
        if children.is_empty() {
            continue;
        }
        let sum: f64 = children.iter().map(|r| r.width).sum();
        assert!((sum - parent.width).abs() < 1e-6, "{}: {sum} vs {}", tree.name(parent.id), parent.width);
        let leftmost = children.iter().map(|r| r.x).fold(f64::INFINITY, f64::min);
        assert!((leftmost - parent.x).abs() < 1e-9);
    }
}

#[test]
fn test_rows_grow_upwards() {
    let tree = tree(PROFILE);
    let config = LayoutConfig::default();
    let layout = compute_layout(&tree, &config).expect("layout");

    // depth 3 → (3 + 2) * 16 + 60
    assert_eq!(layout.height, 140);
    for rect in &layout.rects {
        let expected = f64::from(layout.height) - 30.0 - (rect.depth as f64 + 1.0) * 16.0;
        assert!((rect.y - expected).abs() < 1e-9);
    }
}

#[test]
fn test_colors_follow_names() {
    let svg = render_flamegraph_to_string(&tree(PROFILE), &SvgOptions::default()).expect("render");
    assert!(svg.contains(&format!(r#"fill="{}""#, warm_color("parse"))));
    assert!(svg.contains(&format!(r#"fill="{}""#, warm_color("paint"))));
}

#[test]
fn test_markup_characters_are_escaped() {
    let svg = render_flamegraph_to_string(
        &tree("main;<alloc::vec::Vec<u8> as Drop>::drop 3\nmain;a&b 1\n"),
        &SvgOptions { title: "\"quoted\" & <tagged>".into(), ..SvgOptions::default() },
    )
    .expect("render");

    assert!(svg.contains("&lt;alloc::vec::Vec&lt;u8&gt; as Drop&gt;::drop"));
    assert!(svg.contains("a&amp;b"));
    assert!(svg.contains("&quot;quoted&quot; &amp; &lt;tagged&gt;"));
    assert!(!svg.contains("<alloc"));
}

#[test]
fn test_empty_profile_is_no_samples() {
    let empty = tree("# nothing here\n\n");
    let result = render_flamegraph_to_string(&empty, &SvgOptions::default());
    assert!(matches!(result, Err(RenderError::NoSamples)));
}

#[test]
fn test_diff_render() {
    let before = FoldedStacks::parse_str(PROFILE);
    let after = FoldedStacks::parse_str("main;parse;lex 10\nmain;render;paint 50\nmain;io 5\n");
    let diff = DiffTree::from_profiles(&before, &after, TreeConfig::default());

    let svg = render_diff_to_string(&diff, &SvgOptions::default()).expect("render");
    assert!(svg.contains("Before: 100 samples, After: 65 samples."));
    // ast vanished, so it is still drawn with its before share
    assert!(svg.contains("<title>ast (before: 25 [25.0%], after: 0 [0.0%], delta: -25.0%)</title>"));
    assert_eq!(svg, render_diff_to_string(&diff, &SvgOptions::default()).expect("render"));
}
