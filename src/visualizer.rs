use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::process::Command;
use std::rc::Rc;

use color_eyre::eyre::Result;
use eframe::{run_native, App, CreationContext, NativeOptions};
use egui::Color32;
use egui_graphs::{
    DefaultGraphView, Graph, SettingsInteraction, SettingsNavigation, SettingsStyle,
};
use petgraph::dot::Dot;
use petgraph::graph::DiGraph;
use petgraph::{graph::EdgeIndex, graph::NodeIndex, prelude::StableGraph};

use crate::fa::FA;
use crate::regex::SyntaxTree;

struct Visualizer {
    graph: Graph,
}

impl Visualizer {
    fn new(_: &CreationContext<'_>, graph: Graph) -> Self {
        Visualizer { graph }
    }
}

impl App for Visualizer {
    fn update(&mut self, ctx: &egui::Context, _: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let navigation_settings = &SettingsNavigation::new()
                .with_zoom_and_pan_enabled(true)
                .with_fit_to_screen_enabled(true);
            let interactive_settings = &SettingsInteraction::new()
                .with_dragging_enabled(true)
                .with_node_clicking_enabled(true)
                .with_node_selection_enabled(true)
                .with_node_selection_multi_enabled(true)
                .with_edge_clicking_enabled(true)
                .with_edge_selection_enabled(true)
                .with_edge_selection_multi_enabled(true);
            let style_settings = &SettingsStyle::default().with_labels_always(true);
            ui.add(
                &mut DefaultGraphView::new(&mut self.graph)
                    .with_styles(style_settings)
                    .with_interactions(interactive_settings)
                    .with_navigations(navigation_settings),
            );
        });
    }
}

fn generate_stable_graph<T: FA>(fa: &T) -> Graph {
    let mut stable_graph = StableGraph::new();

    let state_labels = fa.get_state_labels();

    let start_node_color = Color32::from_rgb(20, 67, 130);
    let accept_node_color = Color32::from_rgb(20, 130, 90);

    let mut node_map: HashMap<String, NodeIndex> = HashMap::new();
    let mut edge_map: HashMap<(NodeIndex, NodeIndex), EdgeIndex> = HashMap::new();

    // Add all nodes

    for state_label in &state_labels {
        let node_idx = stable_graph.add_node(());
        node_map.insert(state_label.clone(), node_idx);
    }

    // Add all edges and store in map for adding labels later

    for (from_label, _, to_label) in fa.get_edge_labels() {
        let from_idx = node_map[&from_label];
        let to_idx = node_map[&to_label];

        if !stable_graph.contains_edge(from_idx, to_idx) {
            let edge_idx = stable_graph.add_edge(from_idx, to_idx, ());
            edge_map.insert((from_idx, to_idx), edge_idx);
        }
    }

    let mut graph = Graph::from(&stable_graph);

    let start_node = graph.node_mut(node_map[&fa.get_start_label()]).unwrap();
    start_node.set_color(start_node_color);

    for accept_label in fa.get_accept_labels() {
        let accept_node = graph.node_mut(node_map[&accept_label]).unwrap();
        accept_node.set_color(accept_node_color);
    }

    for state_label in &state_labels {
        let node_label = format!("State {}", state_label);
        graph
            .node_mut(node_map[state_label])
            .unwrap()
            .set_label(node_label);
    }

    for (from_label, symbol_label, to_label) in fa.get_edge_labels() {
        let edge_idx = edge_map
            .get(&(node_map[&from_label], node_map[&to_label]))
            .unwrap();
        let edge = graph.edge_mut(*edge_idx).unwrap();

        // parallel transitions share one arrow whose label collects their
        // symbols; a default label still starts with "e"
        let old_label = edge.label();
        let new_label = if old_label.starts_with("e") {
            symbol_label
        } else {
            format!("{}, {}", old_label, symbol_label)
        };

        edge.set_label(new_label);
    }

    graph
}

/// Open an interactive window showing the finite automaton, with zooming,
/// panning and clickable elements.
pub fn visualize<T: FA>(fa: &T, title: &str) -> Result<()> {
    let graph = generate_stable_graph(fa);
    run_native(
        title,
        NativeOptions::default(),
        Box::new(|cc| Ok(Box::new(Visualizer::new(cc, graph)))),
    )
    .map_err(|e| color_eyre::eyre::eyre!("{e}"))?;
    Ok(())
}

fn render_dot_graph(graph: &DiGraph<String, String>, filename: &str) -> Result<()> {
    let dot = Dot::new(graph);

    // Write dot to file
    let dot_filename = format!("{}.dot", filename);
    let mut dot_file = File::create(&dot_filename)?;
    dot_file.write_all(dot.to_string().as_bytes())?;

    Command::new("dot")
        .args(["-Tjpg", &dot_filename, "-o", &format!("{}.jpg", filename)])
        .output()?;

    Ok(())
}

/// Render the finite automaton through Graphviz and save it as a jpg next to
/// its dot source.
pub fn save_fa<T: FA>(fa: &T, filename: &str) -> Result<()> {
    let mut graph = DiGraph::new();
    let mut node_map = HashMap::new();

    for state_label in fa.get_state_labels() {
        let node = graph.add_node(format!("State {}", state_label));
        node_map.insert(state_label, node);
    }

    for (from_label, symbol_label, to_label) in fa.get_edge_labels() {
        graph.add_edge(node_map[&from_label], node_map[&to_label], symbol_label);
    }

    // Mark Start and Accept States

    let start_label = fa.get_start_label();
    let start_node = node_map[&start_label];
    graph[start_node] = format!("Start\nState {}", start_label);

    for accept_label in fa.get_accept_labels() {
        let accept_node = node_map[&accept_label];
        graph[accept_node] = format!("Accept\nState {}", accept_label);
    }

    render_dot_graph(&graph, filename)?;

    println!("Automaton visualization saved as {filename}.jpg");
    Ok(())
}

// Nodes are labelled with their operator or literal; each child points at its
// parent so the root sits at the top of the rendered image.
fn add_tree_nodes(
    tree: &Rc<SyntaxTree>,
    graph: &mut DiGraph<String, String>,
) -> NodeIndex {
    match tree.as_ref() {
        SyntaxTree::Leaf(token) => graph.add_node(token.to_string()),
        SyntaxTree::Unary(token, child) => {
            let node = graph.add_node(token.to_string());
            let child_node = add_tree_nodes(child, graph);
            graph.add_edge(child_node, node, String::new());
            node
        }
        SyntaxTree::Binary(token, left, right) => {
            let node = graph.add_node(token.to_string());
            let left_node = add_tree_nodes(left, graph);
            let right_node = add_tree_nodes(right, graph);
            graph.add_edge(left_node, node, String::new());
            graph.add_edge(right_node, node, String::new());
            node
        }
    }
}

/// Render the syntax tree of an expression through Graphviz and save it as a
/// jpg next to its dot source.
pub fn save_tree(tree: &Rc<SyntaxTree>, filename: &str) -> Result<()> {
    let mut graph = DiGraph::new();
    add_tree_nodes(tree, &mut graph);

    render_dot_graph(&graph, filename)?;

    println!("Syntax tree visualization saved as {filename}.jpg");
    Ok(())
}
