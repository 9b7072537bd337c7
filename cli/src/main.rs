mod config;
mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use mdl::doc_tree::dump::dump as dump_doc;
use mdl::parse_tree::dump::dump as dump_parse;
use mdl::{Document, DocumentOptions, ParseError};

use config::{Config, Diagnostics};

const SUBCOMMANDS: &[&str] = &["parse", "test", "help"];

#[derive(Parser)]
#[command(name = "mdl", version, about = "MDL document processor")]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Config file (default: ./mdl.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Columns a tab counts for in error positions
    #[arg(long, global = true)]
    tab_size: Option<usize>,

    /// How parse errors are shown
    #[arg(long, global = true, value_enum)]
    diagnostics: Option<Diagnostics>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and convert an MDL document
    Parse(ParseArgs),

    /// Run golden-file tests (.mdl with .parse/.doc/.predoc/.toml expectations)
    Test(TestArgs),
}

#[derive(clap::Args)]
struct ParseArgs {
    /// MDL source file
    file: String,

    /// Only report whether the document is valid
    #[arg(long)]
    check: bool,

    /// Dump the parse tree
    #[arg(long)]
    dump_parse: bool,

    /// Dump the document tree before normalization
    #[arg(long)]
    dump_predoc: bool,

    /// Dump the final document tree
    #[arg(long)]
    dump_doc: bool,

    /// Write the parse tree dump to a file
    #[arg(long)]
    write_parse: Option<PathBuf>,

    /// Write the pre-normalization document dump to a file
    #[arg(long)]
    write_predoc: Option<PathBuf>,

    /// Write the final document dump to a file
    #[arg(long)]
    write_doc: Option<PathBuf>,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to an .mdl file or a directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    env_logger::init();

    // `mdl doc.mdl` is shorthand for `mdl parse doc.mdl`.
    let mut args: Vec<String> = std::env::args().collect();
    let first_pos = args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, a)| !a.starts_with('-'))
        .map(|(i, a)| (i, a.clone()));
    if let Some((pos, first)) = first_pos {
        if !SUBCOMMANDS.contains(&first.as_str()) {
            args.insert(pos, "parse".to_string());
        }
    }

    let cli = Cli::parse_from(&args);

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    };
    if let Some(tab_size) = cli.tab_size {
        config.tab_size = tab_size;
    }
    if let Some(diagnostics) = cli.diagnostics {
        config.diagnostics = diagnostics;
    }

    match cli.command {
        Command::Parse(parse_args) => process::exit(do_parse(&parse_args, &config, cli.no_color)),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn do_parse(args: &ParseArgs, config: &Config, no_color: bool) -> i32 {
    let text = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", args.file, e);
            return 1;
        }
    };

    let result = (|| -> Result<(), ParseError> {
        let tree = mdl::parser::parse_str(&text, Some(&args.file))?;
        emit(args.dump_parse, args.write_parse.as_deref(), || dump_parse(&tree));

        if args.dump_predoc || args.write_predoc.is_some() {
            let predocs = mdl::convert_documents(&tree, DocumentOptions { normalize: false })?;
            emit(args.dump_predoc, args.write_predoc.as_deref(), || dump_all(&predocs));
        }

        let docs = mdl::convert_documents(&tree, DocumentOptions::default())?;
        log::debug!("{} document(s) in {}", docs.len(), args.file);
        emit(args.dump_doc, args.write_doc.as_deref(), || dump_all(&docs));
        Ok(())
    })();

    match result {
        Ok(()) => {
            if args.check {
                eprintln!("ok: {} parsed successfully", args.file);
            }
            0
        }
        Err(err) => {
            report(&err, &args.file, config, no_color);
            1
        }
    }
}

/// Document dumps back to back, in input order.
fn dump_all(docs: &[Document]) -> String {
    docs.iter().map(|doc| dump_doc(&doc.tree)).collect()
}

/// Print a dump and/or write it to a file.
fn emit(print: bool, write: Option<&Path>, render: impl FnOnce() -> String) {
    if !print && write.is_none() {
        return;
    }
    let text = render();
    if print {
        print!("{}", text);
    }
    if let Some(path) = write {
        log::info!("writing {}", path.display());
        if let Err(e) = std::fs::write(path, &text) {
            eprintln!("error: cannot write '{}': {}", path.display(), e);
        }
    }
}

fn report(err: &ParseError, file: &str, config: &Config, no_color: bool) {
    match config.diagnostics {
        Diagnostics::Plain => {
            eprintln!("{}", err.format_with(config.tab_size));
            eprint!("{}", err.context(config.context_before, config.context_after));
        }
        Diagnostics::Rich => {
            let color_choice = if no_color {
                ColorChoice::Never
            } else {
                ColorChoice::Auto
            };
            let mut files = SimpleFiles::new();
            let file_id = files.add(file.to_string(), err.location.source_text().to_string());
            let writer = StandardStream::stderr(color_choice);
            let term_config = term::Config {
                tab_width: config.tab_size,
                ..term::Config::default()
            };
            let diagnostic = err.to_diagnostic(file_id);
            let _ = term::emit_to_write_style(&mut writer.lock(), &term_config, &files, &diagnostic);
        }
    }
}
