use pyrograph::aggregation::{FoldedStacks, FrameFilter, FrameTree, StackFolder, TreeConfig, ROOT_NAME};
use std::io::BufReader;

const SCENARIO: &str = "a;b;c 3\na;b;d 2\na;e 1\n";

fn counts(tree: &FrameTree, path: &[&str]) -> (u64, u64) {
    let node = tree.find(path).unwrap_or_else(|| panic!("missing {path:?}"));
    (node.inclusive, node.self_count)
}

#[test]
fn test_scenario_counts() {
    let folded = FoldedStacks::parse_str(SCENARIO);
    let tree = FrameTree::from_folded(&folded, TreeConfig::default());

    assert_eq!(tree.node(tree.root()).name, ROOT_NAME);
    assert_eq!(tree.total_samples(), 6);
    assert_eq!(tree.node(tree.root()).self_count, 0);
    assert_eq!(counts(&tree, &["a"]), (6, 0));
    assert_eq!(counts(&tree, &["a", "b"]), (5, 0));
    assert_eq!(counts(&tree, &["a", "b", "c"]), (3, 3));
    assert_eq!(counts(&tree, &["a", "b", "d"]), (2, 2));
    assert_eq!(counts(&tree, &["a", "e"]), (1, 1));
    assert!(tree.is_consistent());
}

#[test]
fn test_total_matches_sum_of_counts() {
    let text = "\
# comment
main;parse 10
main;parse;lex 4

main;render 7
main;render 1
broken line without count
main;bad -3
main;zero 0
";
    let folded = FoldedStacks::parse_str(text);
    assert_eq!(folded.total_samples(), 22);
    assert_eq!(folded.count_of("main;render"), 8);
    assert_eq!(folded.skipped_lines(), 3);

    let tree = FrameTree::from_folded(&folded, TreeConfig::default());
    assert_eq!(tree.total_samples(), folded.total_samples());
    assert!(tree.is_consistent());
}

#[test]
fn test_round_trip_through_file() {
    let folded = FoldedStacks::parse_str("z;y 2\na;b 5\na 1\nz;y 3\n");
    let file = tempfile::NamedTempFile::new().expect("temp file");
    folded.write_to(file.as_file()).expect("write");

    let written = std::fs::read_to_string(file.path()).expect("read back");
    assert_eq!(written, "a 1\na;b 5\nz;y 5\n");

    let reader = BufReader::new(std::fs::File::open(file.path()).expect("open"));
    let reread = FoldedStacks::parse(reader).expect("parse");
    assert_eq!(reread, folded);

    let first = FrameTree::from_folded(&folded, TreeConfig::default());
    let second = FrameTree::from_folded(&reread, TreeConfig::default());
    assert_eq!(first.total_samples(), second.total_samples());
    assert_eq!(second.total_samples(), 11);
}

#[test]
fn test_folder_output_feeds_tree() {
    let mut folder = StackFolder::new(FrameFilter::sentinels());
    // deepest first, as captured
    folder.add_stack(&["leaf", "mid", "main"]);
    folder.add_stack(&["leaf", "[unknown]", "mid", "main"]);
    folder.add_stack(&["mid", "main"]);
    folder.add_stack(&["[unknown]", "[null]"]);

    assert_eq!(folder.samples(), 4);
    assert_eq!(folder.discarded(), 1);

    let folded = folder.finish();
    assert_eq!(folded.count_of("main;mid;leaf"), 2);
    assert_eq!(folded.count_of("main;mid"), 1);

    let tree = FrameTree::from_folded(&folded, TreeConfig::default());
    assert_eq!(counts(&tree, &["main", "mid"]), (3, 1));
    assert_eq!(counts(&tree, &["main", "mid", "leaf"]), (2, 2));
}

#[test]
fn test_child_cap_keeps_counts() {
    let mut text = String::new();
    for i in 0..20 {
        text.push_str(&format!("main;f{i:02};leaf 1\n"));
    }
    let folded = FoldedStacks::parse_str(&text);
    let tree = FrameTree::from_folded(&folded, TreeConfig { max_children: 8 });

    let main = tree.find(&["main"]).expect("main");
    assert_eq!(main.inclusive, 20);
    assert_eq!(main.child_count(), 9);
    assert_eq!(counts(&tree, &["main", "[other]"]), (12, 0));
    assert_eq!(counts(&tree, &["main", "[other]", "leaf"]), (12, 12));
    assert_eq!(tree.overflowed_parents(), 1);
    assert!(tree.is_consistent());
}
