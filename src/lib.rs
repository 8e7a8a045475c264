//! # regviz
//!
//! A regular expression compiler and visualizer.
//!
//! This library provides functionality to:
//! - Desugar and parse regular expressions into syntax trees
//! - Convert regular expressions to NFAs using Thompson Construction
//! - Convert NFAs to DFAs using Subset Construction
//! - Minimize DFAs using partition refinement
//! - Decide word membership on the NFA, the DFA and the minimal DFA
//! - Visualize the syntax tree and the automata state machines

// Re-export the modules
pub mod dfa;
pub mod fa;
pub mod nfa;
pub mod pipeline;
pub mod regex;
pub mod visualizer;

// Re-export commonly used functions for convenience
pub use dfa::{construct_dfa, construct_minimal_dfa, load_dfa};
pub use nfa::{construct_nfa, load_nfa};
pub use pipeline::{compile, decide};
pub use regex::{build_tree, desugar, to_postfix, tokenize};
pub use visualizer::{save_fa, save_tree, visualize};
