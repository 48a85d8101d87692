//! askgate: ask your shell a question.
//!
//! Modes:
//!   - `askgate what is using port 8080`: synthesize, gate, run, answer
//!   - `askgate --exec CMD [--force]`: run a command through the safety gate
//!   - `askgate --check CMD`: print the verdict, run nothing
//!   - `askgate --tool`: read a JSON tool request on stdin, write the result on stdout

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;

use askgate::compose::AnswerComposer;
use askgate::config::Config;
use askgate::exec::ShellRunner;
use askgate::gate::{ExecutionResult, SafetyGate};
use askgate::memory::{InteractionMemory, JsonFileStore};
use askgate::model::{ExternalModel, ModelService};
use askgate::pipeline::QuestionPipeline;
use askgate::risk::{RiskClassifier, paths};
use askgate::synth::CommandSynthesizer;
use askgate::{logging, prompt, tools};

#[derive(Parser)]
#[command(name = "askgate")]
#[command(about = "Answer shell questions through a command-safety gate")]
#[command(version)]
struct Cli {
    /// The question to answer
    question: Vec<String>,

    /// Run a shell command through the safety gate
    #[arg(short = 'x', long, value_name = "COMMAND", conflicts_with = "check")]
    exec: Option<String>,

    /// Classify a command and print the verdict without running it
    #[arg(short, long, value_name = "COMMAND")]
    check: Option<String>,

    /// Skip the safety check (with --exec)
    #[arg(long, requires = "exec")]
    force: bool,

    /// Working directory for the command
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Read a JSON tool request from stdin
    #[arg(long)]
    tool: bool,

    /// List the tools available to --tool
    #[arg(long)]
    list_tools: bool,

    /// Ask for confirmation instead of blocking
    #[arg(long)]
    escalate_block: bool,

    /// History session id
    #[arg(long, default_value = "default")]
    session: String,

    /// Print the merged configuration as TOML
    #[arg(long)]
    dump_config: bool,

    /// Print the system prompt handed to the model
    #[arg(long)]
    show_prompt: bool,

    /// Debug output on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = Config::load();
    if cli.escalate_block {
        config.settings.escalate_block = true;
    }

    if cli.dump_config {
        return match config.to_toml() {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("failed to serialize config: {e}");
                ExitCode::FAILURE
            }
        };
    }

    if cli.list_tools {
        for tool in tools::TOOLS {
            println!("{}\t{}", tool.name, tool.description);
        }
        return ExitCode::SUCCESS;
    }

    let prompt_path = PathBuf::from(paths::expand(&config.model.system_prompt_file));
    let system_prompt = prompt::load_system_prompt(&prompt_path);
    if cli.show_prompt {
        println!("{system_prompt}");
        return ExitCode::SUCCESS;
    }

    let cwd = cli.cwd.as_deref();
    if let Some(command) = &cli.check {
        let verdict = RiskClassifier::from_config(&config).classify(command, cwd);
        let printed = print_json(&verdict);
        if verdict.allowed && !verdict.requires_confirmation {
            return printed;
        }
        return ExitCode::FAILURE;
    }

    let pipeline = build_pipeline(&config, &cli.session, system_prompt);

    if cli.tool {
        let mut input = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut input) {
            eprintln!("failed to read stdin: {e}");
            return ExitCode::FAILURE;
        }
        return print_json(&tools::handle_request(&pipeline, &input));
    }

    if let Some(command) = &cli.exec {
        let result = pipeline.execute_command(command, cwd, cli.force);
        return report_execution(&result);
    }

    if cli.question.is_empty() {
        eprintln!("nothing to do: ask a question, or use --exec, --check or --tool (see --help)");
        return ExitCode::from(2);
    }
    let question = cli.question.join(" ");
    let answer = pipeline.answer_question(&question, cwd);
    eprintln!("$ {}", answer.command_used);
    println!("{}", answer.answer);
    if answer.succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn build_pipeline(config: &Config, session: &str, system_prompt: String) -> QuestionPipeline {
    let store = JsonFileStore::for_session(&config.history_dir(), session);
    let memory = Arc::new(InteractionMemory::load(Box::new(store), config.history.capacity));
    let model: Arc<dyn ModelService> = Arc::new(ExternalModel::new(&config.model, system_prompt));
    let runner = ShellRunner::from_config(&config.execution);
    let gate = SafetyGate::from_config(config, Box::new(runner), memory.clone());
    QuestionPipeline::new(
        CommandSynthesizer::new(model.clone(), &config.model),
        gate,
        AnswerComposer::new(model, &config.model),
        memory,
        config.history.summary_chars,
    )
}

fn print_json(value: &impl Serialize) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("failed to encode result: {e}");
            ExitCode::FAILURE
        }
    }
}

fn report_execution(result: &ExecutionResult) -> ExitCode {
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    if result.blocked {
        eprintln!("blocked: {}", result.stderr);
        for alt in &result.alternatives {
            eprintln!("  try: {alt}");
        }
        return ExitCode::FAILURE;
    }
    if result.requires_confirmation {
        let level = result.risk_level.unwrap_or_default();
        eprintln!("{} ({level} risk); re-run with --force to proceed", result.stderr);
        if let Some(backup) = &result.backup {
            eprintln!("  {backup}");
        }
        return ExitCode::FAILURE;
    }
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    exit_code(result.exit_code)
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
