/* Thompson construction of an NFA from a regex syntax tree, plus structural
 * validation, canonical BFS renumbering and state-set simulation. */

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Write};
use std::rc::Rc;

use color_eyre::eyre::Result;

use crate::fa::{normalize_word, Symbol, FA};
use crate::regex::{RegexError, SyntaxTree, Token};

/// A non-deterministic finite automaton with a single start and a single
/// accept state. The transition relation maps a state to the ordered list of
/// its outgoing (symbol, destination) pairs; several transitions per
/// (state, symbol) pair are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NFA {
    start: usize,
    accept: usize,
    transitions: BTreeMap<usize, Vec<(Symbol, usize)>>,
}

/// A non-fatal structural finding reported by [`NFA::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    StartNotReferenced(usize),
    AcceptNotReferenced(usize),
    StartHasIncoming(usize, usize),
    AcceptHasOutgoing(usize, usize),
    UnreachableStates(Vec<usize>),
    AcceptUnreachable(usize),
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::StartNotReferenced(state) => {
                write!(f, "Start state {} does not appear in the transitions", state)
            }
            Issue::AcceptNotReferenced(state) => {
                write!(f, "Accept state {} does not appear in the transitions", state)
            }
            Issue::StartHasIncoming(state, indegree) => write!(
                f,
                "Start state {} has indegree {} (expected 0)",
                state, indegree
            ),
            Issue::AcceptHasOutgoing(state, outdegree) => write!(
                f,
                "Accept state {} has outdegree {} (expected 0)",
                state, outdegree
            ),
            Issue::UnreachableStates(states) => {
                write!(f, "States unreachable from the start state: {:?}", states)
            }
            Issue::AcceptUnreachable(state) => {
                write!(f, "Accept state {} is not reachable from the start state", state)
            }
        }
    }
}

impl NFA {
    pub fn new(start: usize, accept: usize) -> Self {
        NFA {
            start,
            accept,
            transitions: BTreeMap::new(),
        }
    }

    pub fn add_transition(&mut self, from: usize, symbol: Symbol, to: usize) {
        self.transitions.entry(from).or_default().push((symbol, to));
    }

    fn merge_transitions(&mut self, other: BTreeMap<usize, Vec<(Symbol, usize)>>) {
        for (state, list) in other {
            self.transitions.entry(state).or_default().extend(list);
        }
    }

    pub fn get_start(&self) -> usize {
        self.start
    }

    pub fn get_accept(&self) -> usize {
        self.accept
    }

    pub fn get_transitions(&self) -> &BTreeMap<usize, Vec<(Symbol, usize)>> {
        &self.transitions
    }

    pub(crate) fn get_transition_list(&self, state: usize) -> &[(Symbol, usize)] {
        self.transitions
            .get(&state)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Every state referenced by the transition relation.
    pub fn get_states(&self) -> BTreeSet<usize> {
        let mut states: BTreeSet<usize> = self.transitions.keys().copied().collect();
        for list in self.transitions.values() {
            for (_, target) in list {
                states.insert(*target);
            }
        }
        states
    }

    /// All non-epsilon symbols appearing on transitions.
    pub fn get_alphabet(&self) -> BTreeSet<char> {
        let mut alphabet = BTreeSet::new();
        for list in self.transitions.values() {
            for (symbol, _) in list {
                if let Symbol::Char(ch) = symbol {
                    alphabet.insert(*ch);
                }
            }
        }
        alphabet
    }

    // Bit capacity large enough to index any state id of this NFA.
    pub(crate) fn bit_capacity(&self) -> usize {
        let max_referenced = self.get_states().last().copied().unwrap_or(0);
        max_referenced.max(self.start).max(self.accept) + 1
    }

    /// Fixed-point expansion of a state set along epsilon edges only.
    pub(crate) fn epsilon_closure(&self, states: &BTreeSet<usize>) -> BTreeSet<usize> {
        let mut visited: BitVec<u8> = BitVec::repeat(false, self.bit_capacity());
        let mut closure = states.clone();
        let mut stack: Vec<usize> = states.iter().copied().collect();

        for state in states {
            visited.set(*state, true);
        }

        while let Some(state) = stack.pop() {
            for (symbol, target) in self.get_transition_list(state) {
                if *symbol == Symbol::Epsilon && !visited[*target] {
                    visited.set(*target, true);
                    closure.insert(*target);
                    stack.push(*target);
                }
            }
        }
        closure
    }

    /// The union of destinations reachable from any state in the set via the
    /// given symbol.
    pub(crate) fn move_set(&self, states: &BTreeSet<usize>, symbol: char) -> BTreeSet<usize> {
        let mut result = BTreeSet::new();
        for state in states {
            for (transition_symbol, target) in self.get_transition_list(*state) {
                if *transition_symbol == Symbol::Char(symbol) {
                    result.insert(*target);
                }
            }
        }
        result
    }

    /// Decide whether the automaton accepts the given word by state-set
    /// simulation. The reserved empty-string symbol denotes the empty word.
    pub fn simulate(&self, word: &str) -> bool {
        let word = normalize_word(word);
        let mut current = self.epsilon_closure(&BTreeSet::from([self.start]));

        for ch in word.chars() {
            current = self.epsilon_closure(&self.move_set(&current, ch));
            if current.is_empty() {
                break;
            }
        }
        current.contains(&self.accept)
    }

    /// Check the structural invariants expected of a Thompson-constructed
    /// NFA. Findings are diagnostics, not failures; callers decide how to
    /// surface them.
    pub fn validate(&self) -> Vec<Issue> {
        let mut issues = Vec::new();
        let states = self.get_states();

        if !states.contains(&self.start) {
            issues.push(Issue::StartNotReferenced(self.start));
        }
        if !states.contains(&self.accept) {
            issues.push(Issue::AcceptNotReferenced(self.accept));
        }

        let mut indegree: HashMap<usize, usize> = HashMap::new();
        let mut outdegree: HashMap<usize, usize> = HashMap::new();
        for (state, list) in &self.transitions {
            *outdegree.entry(*state).or_default() += list.len();
            for (_, target) in list {
                *indegree.entry(*target).or_default() += 1;
            }
        }
        let start_indegree = indegree.get(&self.start).copied().unwrap_or(0);
        if start_indegree != 0 {
            issues.push(Issue::StartHasIncoming(self.start, start_indegree));
        }
        let accept_outdegree = outdegree.get(&self.accept).copied().unwrap_or(0);
        if accept_outdegree != 0 {
            issues.push(Issue::AcceptHasOutgoing(self.accept, accept_outdegree));
        }

        let seen = self.reachable_states();
        let unreachable: Vec<usize> = states.difference(&seen).copied().collect();
        if !unreachable.is_empty() {
            issues.push(Issue::UnreachableStates(unreachable));
        }
        if !seen.contains(&self.accept) {
            issues.push(Issue::AcceptUnreachable(self.accept));
        }
        issues
    }

    fn reachable_states(&self) -> BTreeSet<usize> {
        let mut visited: BitVec<u8> = BitVec::repeat(false, self.bit_capacity());
        let mut seen = BTreeSet::from([self.start]);
        let mut queue = VecDeque::from([self.start]);
        visited.set(self.start, true);

        while let Some(state) = queue.pop_front() {
            for (_, target) in self.get_transition_list(state) {
                if !visited[*target] {
                    visited.set(*target, true);
                    seen.insert(*target);
                    queue.push_back(*target);
                }
            }
        }
        seen
    }

    /// Renumber states in breadth-first visitation order from the start
    /// state so the start state becomes 1. Edges are visited in sorted
    /// (symbol, destination) order for reproducibility; states the traversal
    /// misses are appended in sorted original-id order. With `accept_last`
    /// the accept state is pulled out of the ordering and appended at the
    /// end, making its id the maximum.
    pub fn renumber(&self, accept_last: bool) -> NFA {
        let states = self.get_states();
        let mut visited: BitVec<u8> = BitVec::repeat(false, self.bit_capacity());
        let mut queue = VecDeque::from([self.start]);
        let mut order = Vec::new();
        visited.set(self.start, true);

        while let Some(state) = queue.pop_front() {
            order.push(state);
            let mut edges: Vec<(Symbol, usize)> = self.get_transition_list(state).to_vec();
            edges.sort();
            for (_, target) in edges {
                if !visited[target] {
                    visited.set(target, true);
                    queue.push_back(target);
                }
            }
        }

        for state in &states {
            if !visited[*state] {
                order.push(*state);
            }
        }

        if accept_last {
            order.retain(|state| *state != self.accept);
            order.push(self.accept);
        } else if !order.contains(&self.accept) {
            order.push(self.accept);
        }

        let mapping: HashMap<usize, usize> = order
            .iter()
            .enumerate()
            .map(|(position, state)| (*state, position + 1))
            .collect();

        let mut result = NFA::new(mapping[&self.start], mapping[&self.accept]);
        for (state, list) in &self.transitions {
            for (symbol, target) in list {
                result.add_transition(mapping[state], symbol.clone(), mapping[target]);
            }
        }
        result
    }

    /// Save the NFA as pretty-printed JSON.
    pub fn save_nfa(&self, file_name: &str) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(file_name)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}

/// Load an NFA from a saved json file
pub fn load_nfa(file_name: &str) -> Result<NFA> {
    let file = File::open(file_name)?;
    let buf_reader = BufReader::new(file);
    let nfa = serde_json::from_reader(buf_reader)?;
    Ok(nfa)
}

impl FA for NFA {
    fn get_state_labels(&self) -> Vec<String> {
        self.get_states()
            .iter()
            .map(|state| state.to_string())
            .collect()
    }

    fn get_start_label(&self) -> String {
        self.start.to_string()
    }

    fn get_accept_labels(&self) -> Vec<String> {
        vec![self.accept.to_string()]
    }

    fn get_edge_labels(&self) -> Vec<(String, String, String)> {
        let mut edges = Vec::new();
        for (state, list) in &self.transitions {
            for (symbol, target) in list {
                edges.push((state.to_string(), symbol.to_string(), target.to_string()));
            }
        }
        edges
    }
}

// State ids are allocated by a strictly increasing counter private to one
// compilation run; the first allocated id is 1.
struct Thompson {
    next_id: usize,
}

impl Thompson {
    fn new() -> Self {
        Thompson { next_id: 0 }
    }

    fn fresh_state(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn leaf_symbol(token: &Token) -> Result<Symbol, RegexError> {
        match token {
            Token::Epsilon => Ok(Symbol::Epsilon),
            Token::Literal(ch) | Token::Escaped(ch) => Ok(Symbol::Char(*ch)),
            other => Err(RegexError::UnsupportedOperator(other.to_string())),
        }
    }

    fn build(&mut self, node: &SyntaxTree) -> Result<NFA, RegexError> {
        match node {
            SyntaxTree::Leaf(token) => {
                let symbol = Self::leaf_symbol(token)?;
                let start = self.fresh_state();
                let accept = self.fresh_state();
                let mut result = NFA::new(start, accept);
                result.add_transition(start, symbol, accept);
                Ok(result)
            }
            SyntaxTree::Binary(Token::Concat, left, right) => {
                let mut result = self.build(left)?;
                let rhs = self.build(right)?;
                let rhs_start = rhs.start;
                let rhs_accept = rhs.accept;
                result.merge_transitions(rhs.transitions);
                let lhs_accept = result.accept;
                result.add_transition(lhs_accept, Symbol::Epsilon, rhs_start);
                result.accept = rhs_accept;
                Ok(result)
            }
            SyntaxTree::Binary(Token::Union, left, right) => {
                let lhs = self.build(left)?;
                let rhs = self.build(right)?;
                let start = self.fresh_state();
                let accept = self.fresh_state();
                let (lhs_start, lhs_accept) = (lhs.start, lhs.accept);
                let (rhs_start, rhs_accept) = (rhs.start, rhs.accept);
                let mut result = NFA::new(start, accept);
                result.merge_transitions(lhs.transitions);
                result.merge_transitions(rhs.transitions);
                result.add_transition(start, Symbol::Epsilon, lhs_start);
                result.add_transition(start, Symbol::Epsilon, rhs_start);
                result.add_transition(lhs_accept, Symbol::Epsilon, accept);
                result.add_transition(rhs_accept, Symbol::Epsilon, accept);
                Ok(result)
            }
            SyntaxTree::Unary(Token::Star, child) => {
                let inner = self.build(child)?;
                let start = self.fresh_state();
                let accept = self.fresh_state();
                let (inner_start, inner_accept) = (inner.start, inner.accept);
                let mut result = NFA::new(start, accept);
                result.merge_transitions(inner.transitions);
                result.add_transition(start, Symbol::Epsilon, inner_start);
                result.add_transition(start, Symbol::Epsilon, accept);
                result.add_transition(inner_accept, Symbol::Epsilon, inner_start);
                result.add_transition(inner_accept, Symbol::Epsilon, accept);
                Ok(result)
            }
            SyntaxTree::Unary(Token::Plus, child) => {
                // A+ compiles as A.(A*), referencing the same subtree twice
                let rewritten = SyntaxTree::Binary(
                    Token::Concat,
                    Rc::clone(child),
                    Rc::new(SyntaxTree::Unary(Token::Star, Rc::clone(child))),
                );
                self.build(&rewritten)
            }
            SyntaxTree::Unary(Token::Question, child) => {
                let inner = self.build(child)?;
                let start = self.fresh_state();
                let accept = self.fresh_state();
                let (inner_start, inner_accept) = (inner.start, inner.accept);
                let mut result = NFA::new(start, accept);
                result.merge_transitions(inner.transitions);
                result.add_transition(start, Symbol::Epsilon, inner_start);
                result.add_transition(start, Symbol::Epsilon, accept);
                result.add_transition(inner_accept, Symbol::Epsilon, accept);
                Ok(result)
            }
            SyntaxTree::Unary(token, _) | SyntaxTree::Binary(token, _, _) => {
                Err(RegexError::UnsupportedOperator(token.to_string()))
            }
        }
    }
}

/// Lower a syntax tree into an NFA with Thompson's construction rules. Each
/// call uses its own state counter, so independent compilations never share
/// or reuse state ids.
pub fn construct_nfa(tree: &SyntaxTree) -> Result<NFA, RegexError> {
    Thompson::new().build(tree)
}

#[cfg(test)]
mod nfa_tests {
    use super::*;
    use crate::regex::{build_tree, desugar, to_postfix, tokenize};

    fn compile(expression: &str) -> NFA {
        let desugared = desugar(expression).unwrap();
        let postfix = to_postfix(&tokenize(&desugared));
        let tree = build_tree(&postfix).unwrap();
        construct_nfa(&tree).unwrap()
    }

    #[test]
    fn test_literal_construction() {
        let nfa = compile("a");
        assert_eq!(nfa.get_start(), 1);
        assert_eq!(nfa.get_accept(), 2);
        assert_eq!(nfa.get_states().len(), 2);
        assert_eq!(
            nfa.get_transition_list(1),
            &[(Symbol::Char('a'), 2)]
        );
    }

    #[test]
    fn test_concatenation_adds_no_states() {
        // two literals plus the epsilon bridge between them
        let nfa = compile("ab");
        assert_eq!(nfa.get_states().len(), 4);
        assert_eq!(nfa.get_transition_list(2), &[(Symbol::Epsilon, 3)]);
    }

    #[test]
    fn test_alternation_adds_two_states() {
        let nfa = compile("a|b");
        assert_eq!(nfa.get_states().len(), 6);
        let branches = nfa.get_transition_list(nfa.get_start());
        assert_eq!(branches.len(), 2);
        assert!(branches.iter().all(|(symbol, _)| *symbol == Symbol::Epsilon));
    }

    #[test]
    fn test_alphabet_excludes_epsilon() {
        let nfa = compile("(a|b)*c");
        assert_eq!(nfa.get_alphabet(), BTreeSet::from(['a', 'b', 'c']));
    }

    #[test]
    fn test_simulate_single_literal() {
        let nfa = compile("a");
        assert!(nfa.simulate("a"));
        assert!(!nfa.simulate("b"));
        assert!(!nfa.simulate("aa"));
        assert!(!nfa.simulate(""));
    }

    #[test]
    fn test_simulate_star_accepts_empty_word() {
        let nfa = compile("a*");
        assert!(nfa.simulate("ε"));
        assert!(nfa.simulate(""));
        assert!(nfa.simulate("aaaa"));
        assert!(!nfa.simulate("ab"));
    }

    #[test]
    fn test_simulate_substring_pattern() {
        let nfa = compile("(a|b)*abb(a|b)*");
        assert!(nfa.simulate("babbaaaa"));
        assert!(nfa.simulate("abb"));
        assert!(!nfa.simulate("abab"));
        assert!(!nfa.simulate(""));
    }

    #[test]
    fn test_simulate_plus_expansion() {
        let nfa = compile("ab+c");
        assert!(nfa.simulate("abc"));
        assert!(nfa.simulate("abbbc"));
        assert!(!nfa.simulate("ac"));
    }

    #[test]
    fn test_plus_rule_shares_subtree() {
        // a Plus node surviving desugaring still compiles via A.(A*)
        let tree = SyntaxTree::Unary(
            Token::Plus,
            Rc::new(SyntaxTree::Leaf(Token::Literal('a'))),
        );
        let nfa = construct_nfa(&tree).unwrap();
        assert!(nfa.simulate("a"));
        assert!(nfa.simulate("aaa"));
        assert!(!nfa.simulate(""));
    }

    #[test]
    fn test_epsilon_leaf_keeps_reserved_symbol() {
        let nfa = compile("ε");
        assert!(nfa.simulate(""));
        assert!(!nfa.simulate("a"));
        assert!(nfa.get_alphabet().is_empty());
    }

    #[test]
    fn test_escaped_pair_compiles_to_second_character() {
        let nfa = compile("\\*");
        assert!(nfa.simulate("*"));
        assert!(!nfa.simulate("\\"));
    }

    #[test]
    fn test_validate_well_formed() {
        let nfa = compile("(a|b)*abb");
        assert!(nfa.validate().is_empty());
    }

    #[test]
    fn test_validate_degree_violations() {
        let mut nfa = NFA::new(1, 2);
        nfa.add_transition(1, Symbol::Char('a'), 2);
        nfa.add_transition(2, Symbol::Char('a'), 1);

        let issues = nfa.validate();
        assert!(issues.contains(&Issue::StartHasIncoming(1, 1)));
        assert!(issues.contains(&Issue::AcceptHasOutgoing(2, 1)));
    }

    #[test]
    fn test_validate_unreachable_states() {
        let mut nfa = NFA::new(1, 2);
        nfa.add_transition(1, Symbol::Char('a'), 2);
        nfa.add_transition(5, Symbol::Char('b'), 6);

        let issues = nfa.validate();
        assert!(issues.contains(&Issue::UnreachableStates(vec![5, 6])));
    }

    #[test]
    fn test_validate_unreachable_accept() {
        let mut nfa = NFA::new(1, 4);
        nfa.add_transition(1, Symbol::Char('a'), 2);
        nfa.add_transition(3, Symbol::Char('b'), 4);

        let issues = nfa.validate();
        assert!(issues.contains(&Issue::AcceptUnreachable(4)));
    }

    #[test]
    fn test_renumber_start_is_one_accept_is_last() {
        let nfa = compile("(a|b)*abb(a|b)*").renumber(true);
        let states = nfa.get_states();
        assert_eq!(nfa.get_start(), 1);
        assert_eq!(nfa.get_accept(), *states.last().unwrap());
        assert_eq!(states.len(), compile("(a|b)*abb(a|b)*").get_states().len());
    }

    #[test]
    fn test_renumber_preserves_language() {
        let nfa = compile("ab+c");
        let renumbered = nfa.renumber(true);
        for word in ["abc", "abbbc", "ac", "", "abcc"] {
            assert_eq!(nfa.simulate(word), renumbered.simulate(word));
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let nfa = compile("(a|b)*abb").renumber(true);
        let file_name = std::env::temp_dir().join("regviz_nfa_round_trip.json");
        let file_name = file_name.to_str().unwrap();
        nfa.save_nfa(file_name).unwrap();
        let loaded = load_nfa(file_name).unwrap();
        assert_eq!(nfa, loaded);
        std::fs::remove_file(file_name).unwrap();
    }
}
