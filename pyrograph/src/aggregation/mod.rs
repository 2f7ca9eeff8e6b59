//! # Stack Aggregation
//!
//! Turns many symbolized samples into one weighted call tree:
//!
//! ```text
//! [leaf, mid, main] ×N ──StackFolder──▶ "main;mid;leaf N" ──FrameTree──▶ root
//!                                                                      └─ main
//!                                                                          └─ mid
//!                                                                              └─ leaf
//! ```
//!
//! - **`folded`**: [`FoldedStacks`], the deduplicated stack set, plus its
//!   text format (read and write)
//! - **`stack_folder`**: [`StackFolder`], which reverses, filters and counts
//!   samples
//! - **`frame_tree`**: [`FrameTree`], inclusive/self counts per call path
//!
//! All three are single-threaded passes over data captured before they run.

pub mod folded;
pub mod frame_tree;
pub mod stack_folder;

pub use folded::{FoldedStack, FoldedStacks, FRAME_SEPARATOR};
pub use frame_tree::{FrameNode, FrameTree, NodeId, TreeConfig, OVERFLOW_NAME, ROOT_NAME};
pub use stack_folder::{FrameFilter, StackFolder};
