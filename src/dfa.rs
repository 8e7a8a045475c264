/* Subset construction to convert an NFA into a DFA, and partition refinement
 * to minimize the DFA. DFA states carry the canonical label of the NFA state
 * set they represent; minimization relabels partitions with fresh q-numbered
 * ids. */

use bitvec::prelude::*;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fs::File;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::{BufReader, Write};

use color_eyre::eyre::Result;

use crate::fa::{normalize_word, StateId, Symbol, FA};
use crate::nfa::NFA;

/// A bitvec and its hash stored together, so worklist deduplication hashes
/// each NFA state set once instead of on every probe.
#[derive(Clone)]
struct HashedBitVec {
    bv: BitVec<u8>,
    hash: u64,
}

impl HashedBitVec {
    fn new(bv: BitVec<u8>) -> Self {
        let mut hasher = DefaultHasher::new();
        bv.hash(&mut hasher);
        let hash = hasher.finish();
        Self { bv, hash }
    }
}

impl Hash for HashedBitVec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for HashedBitVec {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bv == other.bv
    }
}

impl Eq for HashedBitVec {}

fn serialize_transition_table<S>(
    table: &BTreeMap<StateId, BTreeMap<char, StateId>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(table.len()))?;
    for (state, row) in table {
        let row_by_string: BTreeMap<String, &StateId> = row
            .iter()
            .map(|(symbol, target)| (symbol.to_string(), target))
            .collect();
        map.serialize_entry(state, &row_by_string)?;
    }
    map.end()
}

fn deserialize_transition_table<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<StateId, BTreeMap<char, StateId>>, D::Error>
where
    D: Deserializer<'de>,
{
    let table: BTreeMap<StateId, BTreeMap<String, StateId>> = BTreeMap::deserialize(deserializer)?;

    let mut result = BTreeMap::new();

    for (state, row) in table {
        let mut new_row = BTreeMap::new();
        for (key, target) in row {
            if key.chars().count() != 1 {
                return Err(serde::de::Error::custom(format!(
                    "Invalid key for char: {}",
                    key
                )));
            }
            new_row.insert(key.chars().next().unwrap(), target);
        }
        result.insert(state, new_row);
    }

    Ok(result)
}

/// A deterministic finite automaton. At most one transition per
/// (state, symbol) pair; the transition function may be partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DFA {
    states: BTreeSet<StateId>,
    alphabet: BTreeSet<char>,
    #[serde(
        serialize_with = "serialize_transition_table",
        deserialize_with = "deserialize_transition_table"
    )]
    transitions: BTreeMap<StateId, BTreeMap<char, StateId>>,
    start: StateId,
    accept_states: BTreeSet<StateId>,
}

impl DFA {
    pub fn new(start: StateId, alphabet: BTreeSet<char>) -> Self {
        let mut states = BTreeSet::new();
        states.insert(start.clone());
        DFA {
            states,
            alphabet,
            transitions: BTreeMap::new(),
            start,
            accept_states: BTreeSet::new(),
        }
    }

    pub fn add_state(&mut self, state: StateId) {
        self.states.insert(state);
    }

    pub fn add_transition(&mut self, from: StateId, symbol: char, to: StateId) {
        self.states.insert(from.clone());
        self.states.insert(to.clone());
        self.alphabet.insert(symbol);
        self.transitions.entry(from).or_default().insert(symbol, to);
    }

    pub fn set_accept_state(&mut self, state: StateId) {
        self.accept_states.insert(state);
    }

    pub fn get_transition(&self, state: &StateId, symbol: char) -> Option<&StateId> {
        self.transitions.get(state).and_then(|row| row.get(&symbol))
    }

    pub fn get_states(&self) -> &BTreeSet<StateId> {
        &self.states
    }

    pub fn get_num_states(&self) -> usize {
        self.states.len()
    }

    pub fn get_alphabet(&self) -> &BTreeSet<char> {
        &self.alphabet
    }

    pub fn get_start(&self) -> &StateId {
        &self.start
    }

    pub fn get_accept_states(&self) -> &BTreeSet<StateId> {
        &self.accept_states
    }

    /// Decide whether the automaton accepts the given word by walking one
    /// transition per character. An undefined transition rejects immediately.
    /// The reserved empty-string symbol denotes the empty word.
    pub fn simulate(&self, word: &str) -> bool {
        if self.states.is_empty() {
            return false;
        }
        let word = normalize_word(word);
        let mut current = &self.start;

        for ch in word.chars() {
            match self.get_transition(current, ch) {
                Some(next) => current = next,
                None => return false,
            }
        }
        self.accept_states.contains(current)
    }

    /// Save the DFA as pretty-printed JSON.
    pub fn save_dfa(&self, file_name: &str) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(file_name)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}

/// Load a DFA from a saved json file
pub fn load_dfa(file_name: &str) -> Result<DFA> {
    let file = File::open(file_name)?;
    let buf_reader = BufReader::new(file);
    let dfa = serde_json::from_reader(buf_reader)?;
    Ok(dfa)
}

impl FA for DFA {
    fn get_state_labels(&self) -> Vec<String> {
        self.states.iter().map(|state| state.to_string()).collect()
    }

    fn get_start_label(&self) -> String {
        self.start.to_string()
    }

    fn get_accept_labels(&self) -> Vec<String> {
        self.accept_states
            .iter()
            .map(|state| state.to_string())
            .collect()
    }

    fn get_edge_labels(&self) -> Vec<(String, String, String)> {
        let mut edges = Vec::new();
        for (state, row) in &self.transitions {
            for (symbol, target) in row {
                edges.push((state.to_string(), symbol.to_string(), target.to_string()));
            }
        }
        edges
    }
}

// Epsilon closure of a bit set of NFA states, returned with its hash so the
// worklist can key discovered DFA states by the underlying set itself rather
// than by its label string.
fn get_epsilon_closure(nfa: &NFA, nfa_states: BitVec<u8>) -> HashedBitVec {
    let capacity = nfa_states.len();
    let mut closure: BitVec<u8> = BitVec::repeat(false, capacity);
    let mut visited: BitVec<u8> = BitVec::repeat(false, capacity);

    let mut queue: VecDeque<usize> = nfa_states.iter_ones().collect();

    while let Some(state) = queue.pop_front() {
        closure.set(state, true);
        for (symbol, target) in nfa.get_transition_list(state) {
            if *symbol == Symbol::Epsilon && !visited[*target] {
                visited.set(*target, true);
                queue.push_back(*target);
            }
        }
    }

    HashedBitVec::new(closure)
}

// The set of states reachable from any member of q via exactly the symbol c.
fn delta(nfa: &NFA, q: &HashedBitVec, c: char) -> BitVec<u8> {
    let mut result: BitVec<u8> = BitVec::repeat(false, q.bv.len());
    for state in q.bv.iter_ones() {
        for (symbol, target) in nfa.get_transition_list(state) {
            if *symbol == Symbol::Char(c) {
                result.set(*target, true);
            }
        }
    }
    result
}

fn subset_label(bv: &BitVec<u8>) -> StateId {
    StateId::Subset(bv.iter_ones().collect())
}

/// Apply the subset construction algorithm on an NFA to build a DFA. Each
/// DFA state is the canonical label of the NFA state set it represents; a
/// symbol whose move set is empty gets no transition, so the result may be
/// partial.
pub fn construct_dfa(nfa: &NFA) -> DFA {
    let alphabet = nfa.get_alphabet();
    let capacity = nfa.bit_capacity();

    let mut start_set: BitVec<u8> = BitVec::repeat(false, capacity);
    start_set.set(nfa.get_start(), true);
    let q0 = get_epsilon_closure(nfa, start_set);

    let start_label = subset_label(&q0.bv);
    let mut result = DFA::new(start_label.clone(), alphabet.clone());
    if q0.bv[nfa.get_accept()] {
        result.set_accept_state(start_label.clone());
    }

    let mut q_list: HashMap<HashedBitVec, StateId> = HashMap::new();
    q_list.insert(q0.clone(), start_label);

    let mut work_list = VecDeque::from([q0]);

    while let Some(q) = work_list.pop_front() {
        let from = q_list.get(&q).unwrap().clone();
        for c in &alphabet {
            let moved = delta(nfa, &q, *c);
            if moved.not_any() {
                continue;
            }

            let t = get_epsilon_closure(nfa, moved);

            let to = if let Some(existing) = q_list.get(&t) {
                existing.clone()
            } else {
                let label = subset_label(&t.bv);
                result.add_state(label.clone());
                if t.bv[nfa.get_accept()] {
                    result.set_accept_state(label.clone());
                }
                q_list.insert(t.clone(), label.clone());
                work_list.push_back(t);
                label
            };

            result.add_transition(from.clone(), *c, to);
        }
    }

    result
}

fn remove_unreachable_states(dfa: &DFA) -> DFA {
    let mut reachable = BTreeSet::from([dfa.start.clone()]);
    let mut queue = VecDeque::from([dfa.start.clone()]);

    while let Some(current) = queue.pop_front() {
        if let Some(row) = dfa.transitions.get(&current) {
            for target in row.values() {
                if reachable.insert(target.clone()) {
                    queue.push_back(target.clone());
                }
            }
        }
    }

    let mut result = DFA {
        states: reachable.clone(),
        alphabet: dfa.alphabet.clone(),
        transitions: BTreeMap::new(),
        start: dfa.start.clone(),
        accept_states: dfa
            .accept_states
            .intersection(&reachable)
            .cloned()
            .collect(),
    };

    for state in &reachable {
        if let Some(row) = dfa.transitions.get(state) {
            for (symbol, target) in row {
                if reachable.contains(target) {
                    result
                        .transitions
                        .entry(state.clone())
                        .or_default()
                        .insert(*symbol, target.clone());
                }
            }
        }
    }

    result
}

// Index of the partition block containing the state, or -1 for an undefined
// transition target.
fn find_partition_containing(state: Option<&StateId>, partitions: &[BTreeSet<StateId>]) -> isize {
    match state {
        None => -1,
        Some(state) => partitions
            .iter()
            .position(|partition| partition.contains(state))
            .map(|index| index as isize)
            .unwrap_or(-1),
    }
}

// Split one block by transition signature: the tuple, over the sorted
// alphabet, of the block index each member transitions into.
fn refine_partition(
    partition: &BTreeSet<StateId>,
    all_partitions: &[BTreeSet<StateId>],
    dfa: &DFA,
) -> Vec<BTreeSet<StateId>> {
    if partition.len() <= 1 {
        return vec![partition.clone()];
    }

    let mut groups: BTreeMap<Vec<isize>, BTreeSet<StateId>> = BTreeMap::new();

    for state in partition {
        let signature: Vec<isize> = dfa
            .alphabet
            .iter()
            .map(|symbol| {
                find_partition_containing(dfa.get_transition(state, *symbol), all_partitions)
            })
            .collect();
        groups.entry(signature).or_default().insert(state.clone());
    }

    groups.into_values().collect()
}

fn build_minimized_dfa(original: &DFA, partitions: &[BTreeSet<StateId>]) -> DFA {
    let mut state_mapping: HashMap<StateId, StateId> = HashMap::new();
    for (index, partition) in partitions.iter().enumerate() {
        for old_state in partition {
            state_mapping.insert(old_state.clone(), StateId::Index(index));
        }
    }

    let start_block = find_partition_containing(Some(&original.start), partitions);
    let mut result = DFA::new(StateId::Index(start_block as usize), original.alphabet.clone());

    for (index, partition) in partitions.iter().enumerate() {
        result.add_state(StateId::Index(index));
        if partition.intersection(&original.accept_states).next().is_some() {
            result.set_accept_state(StateId::Index(index));
        }
    }

    // a stable block's members all share one transition signature, so any
    // representative supplies the block's outgoing transitions
    for (index, partition) in partitions.iter().enumerate() {
        let representative = partition.iter().next().unwrap();
        for symbol in &original.alphabet {
            if let Some(target) = original.get_transition(representative, *symbol) {
                result.add_transition(
                    StateId::Index(index),
                    *symbol,
                    state_mapping.get(target).unwrap().clone(),
                );
            }
        }
    }

    result
}

/// Minimize a DFA: drop states unreachable from the start state, then refine
/// the accept/non-accept partition by transition signature until a full pass
/// splits no block. The pass count is bounded by the reachable state count,
/// so the loop needs no other ceiling.
pub fn construct_minimal_dfa(dfa: &DFA) -> DFA {
    if dfa.states.is_empty() {
        return dfa.clone();
    }

    let reachable = remove_unreachable_states(dfa);
    if reachable.get_num_states() <= 1 {
        return reachable;
    }

    let accept_states: BTreeSet<StateId> = reachable.accept_states.clone();
    let non_accept_states: BTreeSet<StateId> = reachable
        .states
        .difference(&accept_states)
        .cloned()
        .collect();

    let mut partitions: Vec<BTreeSet<StateId>> = Vec::new();
    if !non_accept_states.is_empty() {
        partitions.push(non_accept_states);
    }
    if !accept_states.is_empty() {
        partitions.push(accept_states);
    }

    loop {
        let mut changed = false;
        let mut new_partitions = Vec::new();

        for partition in &partitions {
            let refined = refine_partition(partition, &partitions, &reachable);
            if refined.len() > 1 {
                changed = true;
            }
            new_partitions.extend(refined);
        }

        partitions = new_partitions;
        if !changed {
            break;
        }
    }

    build_minimized_dfa(&reachable, &partitions)
}

#[cfg(test)]
mod dfa_tests {
    use super::*;
    use crate::nfa::construct_nfa;
    use crate::regex::{build_tree, desugar, to_postfix, tokenize};

    fn compile_nfa(expression: &str) -> NFA {
        let desugared = desugar(expression).unwrap();
        let postfix = to_postfix(&tokenize(&desugared));
        let tree = build_tree(&postfix).unwrap();
        construct_nfa(&tree).unwrap().renumber(true)
    }

    fn compile_dfa(expression: &str) -> DFA {
        construct_dfa(&compile_nfa(expression))
    }

    #[test]
    fn test_subset_construction_labels() {
        // 1 --a--> 2 determinizes into the two singleton subsets
        let dfa = compile_dfa("a");
        assert_eq!(dfa.get_start().to_string(), "1");
        let target = dfa.get_transition(dfa.get_start(), 'a').unwrap();
        assert_eq!(target.to_string(), "2");
        assert!(dfa.get_accept_states().contains(target));
        assert_eq!(dfa.get_num_states(), 2);
    }

    #[test]
    fn test_subset_construction_is_partial() {
        let dfa = compile_dfa("ab");
        assert!(dfa.get_transition(dfa.get_start(), 'b').is_none());
        assert!(!dfa.simulate("b"));
        assert!(dfa.simulate("ab"));
    }

    #[test]
    fn test_start_state_can_accept() {
        let dfa = compile_dfa("a*");
        assert!(dfa.get_accept_states().contains(dfa.get_start()));
        assert!(dfa.simulate(""));
        assert!(dfa.simulate("ε"));
        assert!(dfa.simulate("aaa"));
        assert!(!dfa.simulate("b"));
    }

    #[test]
    fn test_dfa_matches_nfa_verdicts() {
        let expressions = ["a", "a|b", "(a|b)*abb(a|b)*", "ab+c", "a*", "(ab)+"];
        let words = ["", "ε", "a", "b", "ab", "abb", "abab", "babbaaaa", "abbbc", "abc", "ac"];
        for expression in expressions {
            let nfa = compile_nfa(expression);
            let dfa = construct_dfa(&nfa);
            let minimal_dfa = construct_minimal_dfa(&dfa);
            for word in words {
                let expected = nfa.simulate(word);
                assert_eq!(dfa.simulate(word), expected, "{} on {}", expression, word);
                assert_eq!(
                    minimal_dfa.simulate(word),
                    expected,
                    "minimal {} on {}",
                    expression,
                    word
                );
            }
        }
    }

    #[test]
    fn test_substring_pattern_verdicts() {
        let dfa = compile_dfa("(a|b)*abb(a|b)*");
        let minimal_dfa = construct_minimal_dfa(&dfa);
        assert!(dfa.simulate("babbaaaa"));
        assert!(minimal_dfa.simulate("babbaaaa"));
        assert!(!dfa.simulate("abab"));
        assert!(!minimal_dfa.simulate("abab"));
    }

    #[test]
    fn test_minimal_dfa_uses_fresh_sequential_labels() {
        let minimal_dfa = construct_minimal_dfa(&compile_dfa("(a|b)*abb"));
        for state in minimal_dfa.get_states() {
            assert!(matches!(state, StateId::Index(_)));
        }
        let indices: Vec<usize> = (0..minimal_dfa.get_num_states()).collect();
        let actual: Vec<usize> = minimal_dfa
            .get_states()
            .iter()
            .map(|state| match state {
                StateId::Index(index) => *index,
                StateId::Subset(_) => unreachable!(),
            })
            .collect();
        assert_eq!(actual, indices);
    }

    #[test]
    fn test_minimization_merges_equivalent_states() {
        // s1 and s3 accept the same residual language and must merge
        let s: Vec<StateId> = (0..4)
            .map(|id| StateId::Subset(BTreeSet::from([id])))
            .collect();
        let mut dfa = DFA::new(s[0].clone(), BTreeSet::from(['a', 'b']));
        dfa.add_transition(s[0].clone(), 'a', s[1].clone());
        dfa.add_transition(s[0].clone(), 'b', s[2].clone());
        dfa.add_transition(s[1].clone(), 'a', s[1].clone());
        dfa.add_transition(s[1].clone(), 'b', s[2].clone());
        dfa.add_transition(s[2].clone(), 'a', s[3].clone());
        dfa.add_transition(s[2].clone(), 'b', s[2].clone());
        dfa.add_transition(s[3].clone(), 'a', s[3].clone());
        dfa.add_transition(s[3].clone(), 'b', s[2].clone());
        dfa.set_accept_state(s[1].clone());
        dfa.set_accept_state(s[3].clone());

        let minimal_dfa = construct_minimal_dfa(&dfa);
        assert_eq!(minimal_dfa.get_num_states(), 2);
        assert_eq!(minimal_dfa.get_accept_states().len(), 1);

        for word in ["a", "ba", "bba", "aab", ""] {
            assert_eq!(dfa.simulate(word), minimal_dfa.simulate(word));
        }
    }

    #[test]
    fn test_minimization_drops_unreachable_states() {
        let s: Vec<StateId> = (0..3)
            .map(|id| StateId::Subset(BTreeSet::from([id])))
            .collect();
        let mut dfa = DFA::new(s[0].clone(), BTreeSet::from(['a']));
        dfa.add_transition(s[0].clone(), 'a', s[1].clone());
        // s2 has no incoming path from the start state
        dfa.add_transition(s[2].clone(), 'a', s[1].clone());
        dfa.set_accept_state(s[1].clone());

        let minimal_dfa = construct_minimal_dfa(&dfa);
        assert_eq!(minimal_dfa.get_num_states(), 2);
        assert!(minimal_dfa.simulate("a"));
        assert!(!minimal_dfa.simulate("aa"));
    }

    #[test]
    fn test_minimization_idempotence() {
        for expression in ["(a|b)*abb(a|b)*", "ab+c", "a?b*"] {
            let minimal_dfa = construct_minimal_dfa(&compile_dfa(expression));
            let again = construct_minimal_dfa(&minimal_dfa);
            assert_eq!(minimal_dfa.get_num_states(), again.get_num_states());
        }
    }

    #[test]
    fn test_single_state_returned_as_is() {
        let start = StateId::Subset(BTreeSet::from([1]));
        let mut dfa = DFA::new(start.clone(), BTreeSet::new());
        dfa.set_accept_state(start.clone());
        let minimal_dfa = construct_minimal_dfa(&dfa);
        assert_eq!(minimal_dfa.get_num_states(), 1);
        assert_eq!(*minimal_dfa.get_start(), start);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dfa = compile_dfa("(a|b)*abb");
        let file_name = std::env::temp_dir().join("regviz_dfa_round_trip.json");
        let file_name = file_name.to_str().unwrap();
        dfa.save_dfa(file_name).unwrap();
        let loaded = load_dfa(file_name).unwrap();
        assert_eq!(dfa, loaded);
        std::fs::remove_file(file_name).unwrap();
    }
}
