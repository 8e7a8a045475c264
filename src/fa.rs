use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The reserved symbol denoting the empty string, both inside expressions and
/// as a stand-alone input word.
pub const EPSILON: char = 'ε';

#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Symbol {
    Epsilon,
    Char(char),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Epsilon => write!(f, "{}", EPSILON),
            Symbol::Char(ch) => write!(f, "{}", ch),
        }
    }
}

/// A state identifier of a finite automaton. NFA states are plain integers;
/// subset construction produces states labelled by the NFA state set they
/// represent; minimization relabels partitions with fresh sequential ids.
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub enum StateId {
    /// A fresh sequential id, rendered as `q0`, `q1`, ...
    Index(usize),
    /// A canonical NFA state set label. Singletons render unbraced, larger
    /// sets render sorted and comma-joined inside braces, the empty set
    /// renders as the no-match marker `∅` and is never a constructed state.
    Subset(BTreeSet<usize>),
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateId::Index(id) => write!(f, "q{}", id),
            StateId::Subset(set) => {
                if set.is_empty() {
                    write!(f, "∅")
                } else if set.len() == 1 {
                    write!(f, "{}", set.iter().next().unwrap())
                } else {
                    let inner: Vec<String> = set.iter().map(|id| id.to_string()).collect();
                    write!(f, "{{{}}}", inner.join(","))
                }
            }
        }
    }
}

impl FromStr for StateId {
    type Err = String;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        if label == "∅" {
            return Ok(StateId::Subset(BTreeSet::new()));
        }
        if let Some(rest) = label.strip_prefix('q') {
            return rest
                .parse::<usize>()
                .map(StateId::Index)
                .map_err(|_| format!("Invalid state label: {}", label));
        }
        if let Some(inner) = label.strip_prefix('{').and_then(|l| l.strip_suffix('}')) {
            let mut set = BTreeSet::new();
            for part in inner.split(',') {
                let id = part
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid state label: {}", label))?;
                set.insert(id);
            }
            return Ok(StateId::Subset(set));
        }
        label
            .parse::<usize>()
            .map(|id| StateId::Subset(BTreeSet::from([id])))
            .map_err(|_| format!("Invalid state label: {}", label))
    }
}

// State ids serialize as their canonical label so they are usable as JSON map
// keys when automata are saved.
impl Serialize for StateId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

/// Read-only view of a finite automaton, sufficient for a renderer to draw
/// it. The core never depends on a particular rendering technology; the
/// visualizer consumes this trait only.
pub trait FA {
    fn get_state_labels(&self) -> Vec<String>;
    fn get_start_label(&self) -> String;
    fn get_accept_labels(&self) -> Vec<String>;
    /// All transitions as (from label, symbol label, to label) triples.
    fn get_edge_labels(&self) -> Vec<(String, String, String)>;
}

/// The reserved empty-string symbol as an input word denotes the empty word.
pub(crate) fn normalize_word(word: &str) -> &str {
    if word.chars().eq(std::iter::once(EPSILON)) {
        ""
    } else {
        word
    }
}

#[cfg(test)]
mod fa_tests {
    use super::*;

    #[test]
    fn test_state_id_labels() {
        assert_eq!(StateId::Index(3).to_string(), "q3");
        assert_eq!(StateId::Subset(BTreeSet::from([7])).to_string(), "7");
        assert_eq!(
            StateId::Subset(BTreeSet::from([3, 1, 2])).to_string(),
            "{1,2,3}"
        );
        assert_eq!(StateId::Subset(BTreeSet::new()).to_string(), "∅");
    }

    #[test]
    fn test_state_id_round_trip() {
        for label in ["q12", "4", "{1,2,3}", "∅"] {
            let id: StateId = label.parse().unwrap();
            assert_eq!(id.to_string(), label);
        }
        assert!("{1,x}".parse::<StateId>().is_err());
        assert!("qx".parse::<StateId>().is_err());
    }

    #[test]
    fn test_normalize_word() {
        assert_eq!(normalize_word("ε"), "");
        assert_eq!(normalize_word("abc"), "abc");
        assert_eq!(normalize_word(""), "");
    }
}
