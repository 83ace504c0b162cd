//! pandamania CLI: rule-based dialogue engine.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use pandamania::config::EngineConfig;
use pandamania::engine::Engine;
use pandamania::knowledge::KnowledgeQuery;
use pandamania::pack::DefinitionPack;
use pandamania::session::SessionId;
use pandamania::workflow::CandidateId;

#[derive(Parser)]
#[command(name = "panda", version, about = "Rule-based dialogue engine")]
struct Cli {
    /// Engine configuration (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Definition pack to load (TOML). Repeatable.
    #[arg(long, global = true)]
    pack: Vec<PathBuf>,

    /// Load the bundled core pack.
    #[arg(long, global = true)]
    core: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive conversation. Lines starting with `:` are admin commands.
    Chat,

    /// Load the packs and report invalid rules.
    Check,

    /// Answer a single utterance.
    Ask {
        /// The utterance.
        #[arg(required = true)]
        words: Vec<String>,
    },

    /// Export engine data as JSON.
    Export {
        #[command(subcommand)]
        action: ExportAction,
    },
}

#[derive(Subcommand)]
enum ExportAction {
    /// All stored facts.
    Facts,
    /// All stored relations.
    Relations,
    /// Everything known about one subject.
    Subject {
        /// Subject term.
        subject: String,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (engine, invalid_rules) = build_engine(&cli)?;

    match cli.command {
        Commands::Chat => chat(&engine)?,

        Commands::Check => {
            println!("{}", engine.info());
            if invalid_rules > 0 {
                miette::bail!("{invalid_rules} invalid rule(s) in the loaded packs");
            }
            println!("All rules valid.");
        }

        Commands::Ask { words } => {
            let session = engine.open_session();
            let reply = engine.respond(session, &words.join(" "))?;
            println!("{reply}");
        }

        Commands::Export { action } => {
            let json = match action {
                ExportAction::Facts => serde_json::to_string_pretty(&engine.knowledge().all_facts()),
                ExportAction::Relations => {
                    serde_json::to_string_pretty(&engine.knowledge().all_relations())
                }
                ExportAction::Subject { subject } => {
                    serde_json::to_string_pretty(&engine.query(&subject))
                }
            }
            .into_diagnostic()?;
            println!("{json}");
        }
    }

    Ok(())
}

/// Build the engine from the global flags. Returns the number of rules
/// the packs failed to load.
fn build_engine(cli: &Cli) -> Result<(Engine, usize)> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if cli.core {
        config.load_core_pack = true;
    }
    let engine = Engine::new(config)?;

    let mut invalid = 0;
    for path in &cli.pack {
        let pack = DefinitionPack::load(path)?;
        let report = engine.load_pack(&pack);
        eprintln!("{report}");
        for (pattern, err) in report.rule_errors {
            eprintln!("  {pattern}: {:?}", miette::Report::new(err));
            invalid += 1;
        }
    }
    Ok((engine, invalid))
}

fn chat(engine: &Engine) -> Result<()> {
    let session = engine.open_session();
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    println!("pandamania ({} rules). Type :help for commands, :quit to leave.", engine.store().len());
    loop {
        print!("> ");
        stdout.flush().into_diagnostic()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).into_diagnostic()? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.strip_prefix(':') {
            Some(command) => {
                if !admin(engine, session, command) {
                    break;
                }
            }
            None => println!("{}", engine.respond(session, line)?),
        }
    }

    let closed = engine.close_session(session)?;
    println!("{}", closed.summary());
    Ok(())
}

/// Run one admin command. Returns `false` when the user asked to quit.
fn admin(engine: &Engine, session: SessionId, command: &str) -> bool {
    let (verb, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(v, r)| (v, r.trim()));

    match verb {
        "quit" | "exit" | "q" => return false,

        "help" => println!(
            ":generate <concept>   draft a pattern for review\n\
             :review [id]          show one candidate, or list all\n\
             :amend <id> <tmpl>    replace a pending candidate's template\n\
             :approve <id>         deploy a pending candidate\n\
             :reject <id> [why]    decline a pending candidate\n\
             :stats                workflow statistics\n\
             :gaps [n]             concepts users asked about that nothing answers\n\
             :kb <subject>         stored facts and relations\n\
             :infer <subject>      derived IS_A relations\n\
             :learned              what this session has learned\n\
             :info                 engine counts\n\
             :quit                 leave"
        ),

        "generate" => match engine.generate_pattern(rest) {
            Ok(id) => print_candidate(engine, id),
            Err(e) => report(e),
        },

        "review" if rest.is_empty() => {
            let candidates = engine.candidates();
            if candidates.is_empty() {
                println!("No candidates.");
            }
            for c in candidates {
                println!("{}  [{}]  {}", c.id, c.state, c.generated_pattern);
            }
        }

        "review" => {
            if let Some(id) = candidate_id(rest) {
                print_candidate(engine, id);
            }
        }

        "amend" => {
            let (id, template) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if let Some(id) = candidate_id(id) {
                match engine.amend(id, template.trim()) {
                    Ok(_) => print_candidate(engine, id),
                    Err(e) => report(e),
                }
            }
        }

        "approve" => {
            if let Some(id) = candidate_id(rest) {
                match engine.approve(id) {
                    Ok(rule) => println!("{id} deployed as {rule}."),
                    Err(e) => report(e),
                }
            }
        }

        "reject" => {
            let (id, reason) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if let Some(id) = candidate_id(id) {
                match engine.reject(id, reason) {
                    Ok(()) => println!("{id} rejected."),
                    Err(e) => report(e),
                }
            }
        }

        "stats" => println!("{}", engine.stats()),

        "gaps" => {
            let limit = rest.parse().unwrap_or(5);
            let gaps = engine.knowledge_gaps(limit);
            if gaps.is_empty() {
                println!("No knowledge gaps recorded.");
            }
            for (i, gap) in gaps.iter().enumerate() {
                println!("  {}. {gap}", i + 1);
            }
        }

        "kb" => print_query(&engine.query(rest)),

        "infer" => {
            let derived = engine.infer(rest);
            if derived.is_empty() {
                println!("Nothing to infer about {rest}.");
            }
            for edge in derived {
                println!("  {edge}");
            }
        }

        "learned" => match engine.session_snapshot(session) {
            Ok(ctx) => println!("{}", ctx.summary()),
            Err(e) => report(e),
        },

        "info" => print!("{}", engine.info()),

        other => println!("Unknown command :{other}. Type :help for the list."),
    }
    true
}

fn candidate_id(text: &str) -> Option<CandidateId> {
    let id = CandidateId::parse(text);
    if id.is_none() {
        println!("Expected a candidate id like PG001, got \"{text}\".");
    }
    id
}

fn print_candidate(engine: &Engine, id: CandidateId) {
    match engine.review(id) {
        Ok(candidate) => println!("{candidate}"),
        Err(e) => report(e),
    }
}

fn print_query(query: &KnowledgeQuery) {
    if query.is_empty() {
        println!("Nothing stored about {}.", query.subject);
        return;
    }
    for fact in &query.facts {
        println!("  {fact}");
    }
    for edge in &query.relations {
        println!("  {edge}");
    }
}

fn report<E>(err: E)
where
    E: miette::Diagnostic + Send + Sync + 'static,
{
    eprintln!("{:?}", miette::Report::new(err));
}
