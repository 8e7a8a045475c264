use clap::{Arg, Command};
use color_eyre::eyre::{bail, Result};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

mod dfa;
mod fa;
mod nfa;
mod pipeline;
mod regex;
mod visualizer;

use pipeline::Compilation;

fn report_compilation(compilation: &Compilation) {
    println!("Expression: {}", compilation.expression);
    println!("  Desugared: {}", compilation.desugared);
    println!("  Postfix:   {}", compilation.postfix);

    for issue in &compilation.issues {
        println!("  Warning: {}", issue);
    }

    println!(
        "  NFA: {} states, DFA: {} states, minimal DFA: {} states",
        compilation.nfa.get_states().len(),
        compilation.dfa.get_num_states(),
        compilation.minimal_dfa.get_num_states()
    );
}

fn report_verdicts(compilation: &Compilation, word: &str) {
    let verdicts = pipeline::decide(compilation, word);
    let shown = if word.is_empty() { "ε" } else { word };
    println!(
        "  '{}' -> NFA: {}, DFA: {}, minimal DFA: {}",
        shown, verdicts.nfa, verdicts.dfa, verdicts.minimal_dfa
    );
    if !verdicts.agree() {
        println!("  Warning: the automata disagree on '{}', this is a construction bug", shown);
    }
}

fn prompt_word() -> Result<Option<String>> {
    print!("Enter a word to test (blank to skip): ");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let word = line.trim();
    if word.is_empty() {
        Ok(None)
    } else {
        Ok(Some(word.to_string()))
    }
}

fn save_artifacts(
    compilation: &Compilation,
    index: usize,
    save_tree: bool,
    save_nfa: bool,
    save_dfa: bool,
    save_minimal_dfa: bool,
) -> Result<()> {
    if save_tree {
        let filename = format!("tree_{}", index);
        visualizer::save_tree(&compilation.tree, &filename)?;
    }
    if save_nfa {
        let filename = format!("nfa_{}", index);
        compilation.nfa.save_nfa(&format!("{}.json", filename))?;
        visualizer::save_fa(&compilation.nfa, &filename)?;
    }
    if save_dfa {
        let filename = format!("dfa_{}", index);
        compilation.dfa.save_dfa(&format!("{}.json", filename))?;
        visualizer::save_fa(&compilation.dfa, &filename)?;
    }
    if save_minimal_dfa {
        let filename = format!("minimal_dfa_{}", index);
        compilation
            .minimal_dfa
            .save_dfa(&format!("{}.json", filename))?;
        visualizer::save_fa(&compilation.minimal_dfa, &filename)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Command::new("regviz")
                        .version("1.0")
                        .about("A regular expression compiler which builds the NFA, DFA and minimal DFA for each expression, decides word membership on all three and visualizes the automata")
                        .arg(
                            Arg::new("regex")
                                .short('r')
                                .long("regex")
                                .value_name("REGEX")
                                .action(clap::ArgAction::Append)
                                .value_parser(clap::value_parser!(String))
                                .help("A regular expression to compile. May be given multiple times")
                        )
                        .arg(
                            Arg::new("expression-file")
                                .short('f')
                                .long("expression-file")
                                .help("A file with one regular expression per line. Blank lines and lines starting with # are skipped")
                                .value_name("EXPRESSION FILE")
                                .value_parser(clap::value_parser!(PathBuf))
                        )
                        .arg(
                            Arg::new("word")
                                .short('w')
                                .long("word")
                                .value_name("WORD")
                                .action(clap::ArgAction::Append)
                                .value_parser(clap::value_parser!(String))
                                .help("A word to test against every expression. May be given multiple times; use ε for the empty word")
                        )
                        .arg(
                            Arg::new("word-file")
                                .short('s')
                                .long("word-file")
                                .help("A file with one input word per line, tested against every expression")
                                .value_name("WORD FILE")
                                .value_parser(clap::value_parser!(PathBuf))
                        )
                        .arg(
                            Arg::new("save-tree")
                                .short('t')
                                .long("save-tree")
                                .help("Save the syntax tree of each expression as a Graphviz rendering")
                                .action(clap::ArgAction::SetTrue)
                        )
                        .arg(
                            Arg::new("save-nfa")
                                .short('n')
                                .long("save-nfa")
                                .help("Save the NFA after Thompson Construction of the regex, as json and as a Graphviz rendering")
                                .action(clap::ArgAction::SetTrue)
                        )
                        .arg(
                            Arg::new("save-dfa")
                                .short('d')
                                .long("save-dfa")
                                .help("Save the un-optimized DFA obtained after Subset Construction of the NFA, as json and as a Graphviz rendering")
                                .action(clap::ArgAction::SetTrue)
                        )
                        .arg(
                            Arg::new("save-minimal-dfa")
                                .short('m')
                                .long("save-minimal-dfa")
                                .help("Save the minimal DFA after partition refinement, as json and as a Graphviz rendering")
                                .action(clap::ArgAction::SetTrue)
                        )
                        .arg(
                            Arg::new("visualize")
                            .short('v')
                            .long("visualize")
                            .help("Visualize a finite automaton of the last expression inside an interactive window that allows for zooming, panning and clicking of elements")
                            .value_name("DFA, NFA, MINIMAL")
                            .value_parser(clap::value_parser!(String))
                            .num_args(1)
                        )
                        .get_matches();

    let mut expressions: Vec<String> = Vec::new();

    if let Some(file_path) = args.get_one::<PathBuf>("expression-file") {
        if !file_path.exists() {
            bail!("Provided expression file does not exist");
        }
        let path = file_path.to_string_lossy();
        expressions = pipeline::read_expression_file(&path)?;
    } else if let Some(values) = args.get_many::<String>("regex") {
        expressions = values.cloned().collect();
    }

    if expressions.is_empty() {
        bail!("Either an expression file or at least one regular expression should be provided");
    }

    let mut words: Vec<String> = Vec::new();

    if let Some(file_path) = args.get_one::<PathBuf>("word-file") {
        if !file_path.exists() {
            bail!("Provided word file does not exist");
        }
        let path = file_path.to_string_lossy();
        words = pipeline::read_word_file(&path)?;
    } else if let Some(values) = args.get_many::<String>("word") {
        words = values.cloned().collect();
    }

    let save_tree = args.get_flag("save-tree");
    let save_nfa = args.get_flag("save-nfa");
    let save_dfa = args.get_flag("save-dfa");
    let save_minimal_dfa = args.get_flag("save-minimal-dfa");

    let visualize = args.get_one::<String>("visualize");

    let visualize = match visualize {
        None => "none",
        Some(str) => {
            if str.eq_ignore_ascii_case("nfa") {
                "nfa"
            } else if str.eq_ignore_ascii_case("dfa") {
                "dfa"
            } else if str.eq_ignore_ascii_case("minimal") {
                "minimal"
            } else {
                bail!("visualize should be one of NFA | DFA | MINIMAL");
            }
        }
    };

    let mut last_compilation: Option<Compilation> = None;

    for (index, expression) in expressions.iter().enumerate() {
        let compilation = match pipeline::compile(expression) {
            Ok(compilation) => compilation,
            Err(error) => {
                // one bad expression should not abort the rest of the batch
                println!("Expression: {}", expression);
                println!("  Error: {}", error);
                continue;
            }
        };

        report_compilation(&compilation);
        save_artifacts(
            &compilation,
            index,
            save_tree,
            save_nfa,
            save_dfa,
            save_minimal_dfa,
        )?;

        if words.is_empty() {
            if let Some(word) = prompt_word()? {
                report_verdicts(&compilation, &word);
            }
        } else {
            for word in &words {
                report_verdicts(&compilation, word);
            }
        }

        last_compilation = Some(compilation);
    }

    if let Some(compilation) = last_compilation {
        let title = format!("regviz: {}", compilation.expression);
        if visualize == "nfa" {
            visualizer::visualize(&compilation.nfa, &title)?;
        } else if visualize == "dfa" {
            visualizer::visualize(&compilation.dfa, &title)?;
        } else if visualize == "minimal" {
            visualizer::visualize(&compilation.minimal_dfa, &title)?;
        }
    }

    Ok(())
}
