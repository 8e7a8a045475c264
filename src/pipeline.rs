/* End-to-end compilation of a regular expression into its three automata,
 * plus the batch-file readers used by the command line front end. */

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::rc::Rc;

use color_eyre::eyre::Result;

use crate::dfa::{construct_dfa, construct_minimal_dfa, DFA};
use crate::nfa::{construct_nfa, Issue, NFA};
use crate::regex::{build_tree, desugar, postfix_string, to_postfix, tokenize, RegexError, SyntaxTree};

/// Every artifact produced while compiling one expression. Intermediate forms
/// are kept so the front end can report them and the visualizer can draw
/// them.
pub struct Compilation {
    pub expression: String,
    pub desugared: String,
    pub postfix: String,
    pub tree: Rc<SyntaxTree>,
    pub nfa: NFA,
    pub issues: Vec<Issue>,
    pub dfa: DFA,
    pub minimal_dfa: DFA,
}

/// Membership verdicts for one word on all three automata of a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdicts {
    pub nfa: bool,
    pub dfa: bool,
    pub minimal_dfa: bool,
}

impl Verdicts {
    /// The three automata recognize the same language, so a disagreement
    /// indicates a construction bug and is worth surfacing.
    pub fn agree(&self) -> bool {
        self.nfa == self.dfa && self.dfa == self.minimal_dfa
    }
}

/// Compile an expression through every stage: desugar the shorthand
/// operators, convert to postfix, build the syntax tree, run the Thompson
/// construction, renumber the NFA, then determinize and minimize.
pub fn compile(expression: &str) -> Result<Compilation, RegexError> {
    let desugared = desugar(expression)?;
    let postfix = to_postfix(&tokenize(&desugared));
    let tree = build_tree(&postfix)?;

    let nfa = construct_nfa(&tree)?;
    let issues = nfa.validate();
    let nfa = nfa.renumber(true);

    let dfa = construct_dfa(&nfa);
    let minimal_dfa = construct_minimal_dfa(&dfa);

    Ok(Compilation {
        expression: expression.to_string(),
        desugared,
        postfix: postfix_string(&postfix),
        tree,
        nfa,
        issues,
        dfa,
        minimal_dfa,
    })
}

/// Decide one word on all three automata of a compilation.
pub fn decide(compilation: &Compilation, word: &str) -> Verdicts {
    Verdicts {
        nfa: compilation.nfa.simulate(word),
        dfa: compilation.dfa.simulate(word),
        minimal_dfa: compilation.minimal_dfa.simulate(word),
    }
}

/// Read a batch file of expressions, one per line. Blank lines and lines
/// starting with # are skipped.
pub fn read_expression_file(file_name: &str) -> Result<Vec<String>> {
    let file = File::open(file_name)?;
    let reader = BufReader::new(file);

    let mut expressions = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        expressions.push(trimmed.to_string());
    }
    Ok(expressions)
}

/// Read a batch file of input words, one per line. Blank lines are skipped;
/// a line holding the empty-string symbol denotes the empty word.
pub fn read_word_file(file_name: &str) -> Result<Vec<String>> {
    let file = File::open(file_name)?;
    let reader = BufReader::new(file);

    let mut words = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        words.push(trimmed.to_string());
    }
    Ok(words)
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_compile_reports_every_stage() {
        let compilation = compile("ab+c").unwrap();
        assert_eq!(compilation.expression, "ab+c");
        assert_eq!(compilation.desugared, "abb*c");
        assert_eq!(compilation.postfix, "ab.b*.c.");
        assert!(compilation.issues.is_empty());
    }

    #[test]
    fn test_compile_rejects_malformed_expression() {
        assert!(compile("(ab").is_err());
        assert!(compile("*a").is_err());
    }

    #[test]
    fn test_verdicts_agree_across_automata() {
        let compilation = compile("(a|b)*abb(a|b)*").unwrap();
        for word in ["babbaaaa", "abab", "", "abb"] {
            let verdicts = decide(&compilation, word);
            assert!(verdicts.agree(), "disagreement on {}", word);
        }
        assert!(decide(&compilation, "babbaaaa").nfa);
        assert!(!decide(&compilation, "abab").nfa);
    }

    #[test]
    fn test_expression_file_skips_comments_and_blanks() {
        let path = std::env::temp_dir().join("regviz_expressions.txt");
        let path = path.to_str().unwrap();
        let mut file = File::create(path).unwrap();
        writeln!(file, "# sample batch").unwrap();
        writeln!(file, "a|b").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  (ab)+  ").unwrap();
        drop(file);

        let expressions = read_expression_file(path).unwrap();
        assert_eq!(expressions, vec!["a|b".to_string(), "(ab)+".to_string()]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_word_file_keeps_epsilon_marker() {
        let path = std::env::temp_dir().join("regviz_words.txt");
        let path = path.to_str().unwrap();
        let mut file = File::create(path).unwrap();
        writeln!(file, "abb").unwrap();
        writeln!(file, "ε").unwrap();
        drop(file);

        let words = read_word_file(path).unwrap();
        assert_eq!(words, vec!["abb".to_string(), "ε".to_string()]);
        std::fs::remove_file(path).unwrap();
    }
}
