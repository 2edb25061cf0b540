mod cli;

use anyhow::Context as _;
use std::path::{Path, PathBuf};
use tmgen::config::Root;
use tmgen::genhcl::{self, GeneratedHcl, Generator};
use tmgen::project::ProjectPath;
use tmgen::stack::{self, Stack};
use tmgen::value::Value;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TMGEN_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Generate(generate_cli) => generate(cli.root, generate_cli),
        cli::Command::List => list(cli.root),
        cli::Command::Globals(globals_cli) => globals(cli.root, globals_cli),
        cli::Command::Evaluate(eval_cli) => evaluate(cli.root, eval_cli),
        cli::Command::PartialEval(partial_cli) => partial_eval(cli.root, partial_cli),
        cli::Command::Dev(dev_cli) => dev(cli.root, dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn root_dir(root: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let dir = match root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    dir.canonicalize()
        .with_context(|| format!("resolving project root {}", dir.display()))
}

fn load(root: Option<PathBuf>) -> anyhow::Result<Root> {
    let dir = root_dir(root)?;
    Ok(Root::load(&dir)?)
}

fn lookup_stack(root: &Root, dir: &str) -> anyhow::Result<Stack> {
    let dir = ProjectPath::new(dir);
    Stack::lookup(root, &dir).with_context(|| format!("{dir} is not a stack"))
}

pub fn generate(root: Option<PathBuf>, cli: cli::GenerateCommand) -> anyhow::Result<()> {
    let root = load(root)?;
    let (requests, vendor_requests) = std::sync::mpsc::channel();
    let generator = Generator::new(&root)
        .with_vendor_dir(ProjectPath::new(&cli.vendor_dir))
        .with_vendor_requests(requests);

    let mut failed = 0;
    for stack in Stack::list(&root) {
        if let Err(err) = generate_stack(&root, &generator, &stack, cli.dry_run) {
            eprintln!("{}:", stack.dir);
            for error in err.chain() {
                eprintln!("  {error}")
            }
            failed += 1;
        }
    }
    drop(generator);

    for request in vendor_requests.try_iter() {
        tracing::info!(url = %request.source.url, reference = %request.source.reference, target = %request.target_dir(), "vendor requested");
    }

    anyhow::ensure!(failed == 0, "code generation failed for {failed} stack(s)");
    Ok(())
}

fn generate_stack(root: &Root, generator: &Generator, stack: &Stack, dry_run: bool) -> anyhow::Result<()> {
    let globals = tmgen::globals::load(root, stack)?;
    let generated = generator.generate(stack, &globals)?;

    let stack_dir = stack.dir.host_path(root.host_dir());
    let mut assertion_failed = false;
    for file in &generated {
        report_asserts(file);
        assertion_failed |= file.assertion_failed();

        let path = stack_dir.join(file.label());
        if file.condition() && !file.assertion_failed() {
            write_generated(&path, file, dry_run)?;
        } else {
            remove_generated(&path, dry_run)?;
        }
    }

    anyhow::ensure!(!assertion_failed, "assertions failed");
    Ok(())
}

fn report_asserts(file: &GeneratedHcl) {
    for assert in file.asserts().iter().filter(|assert| !assert.assertion) {
        let kind = if assert.warning { "warning" } else { "error" };
        eprintln!("{kind}: {}: {}: {}", file.label(), assert.range, assert.message);
    }
}

fn write_generated(path: &Path, file: &GeneratedHcl, dry_run: bool) -> anyhow::Result<()> {
    let text = format!("{}{}", file.header(), file.body());

    match std::fs::read_to_string(path) {
        Ok(current) if current == text => {
            tracing::debug!(path = %path.display(), "unchanged");
            return Ok(());
        }
        Ok(current) if !genhcl::is_generated(&current) => {
            anyhow::bail!("refusing to overwrite {}: not a generated file", path.display())
        }
        _ => {}
    }

    println!("write {}", path.display());
    if dry_run {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

fn remove_generated(path: &Path, dry_run: bool) -> anyhow::Result<()> {
    let Ok(current) = std::fs::read_to_string(path) else {
        return Ok(());
    };
    if !genhcl::is_generated(&current) {
        tracing::debug!(path = %path.display(), "not generated, keeping");
        return Ok(());
    }

    println!("remove {}", path.display());
    if dry_run {
        return Ok(());
    }
    std::fs::remove_file(path).with_context(|| format!("removing {}", path.display()))
}

pub fn list(root: Option<PathBuf>) -> anyhow::Result<()> {
    let root = load(root)?;
    for stack in Stack::list(&root) {
        println!("{}", stack.dir);
    }
    Ok(())
}

pub fn globals(root: Option<PathBuf>, cli: cli::GlobalsCommand) -> anyhow::Result<()> {
    let root = load(root)?;
    let stack = lookup_stack(&root, &cli.stack)?;
    let globals = tmgen::globals::load(&root, &stack)?;

    output(&cli.output, &Value::object(globals))
}

pub fn evaluate(root: Option<PathBuf>, cli: cli::EvaluateCommand) -> anyhow::Result<()> {
    let root = load(root)?;
    let stack = lookup_stack(&root, &cli.stack)?;
    let globals = tmgen::globals::load(&root, &stack)?;
    let evaluator = stack::eval_context(&root, &stack, &globals);

    let expr = tmgen::ast::parse_expression(&cli.expression)?;
    let value = evaluator.eval(&expr)?;

    output(&cli.output, &value.into())
}

pub fn partial_eval(root: Option<PathBuf>, cli: cli::PartialEvalCommand) -> anyhow::Result<()> {
    let root = load(root)?;
    let stack = lookup_stack(&root, &cli.stack)?;
    let globals = tmgen::globals::load(&root, &stack)?;
    let evaluator = stack::eval_context(&root, &stack, &globals);

    let expr = tmgen::ast::parse_expression(&cli.expression)?;
    let expr = evaluator.partial_eval(&expr)?;

    println!("{}", tmgen::eval::expr_to_string(&expr));
    Ok(())
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (tmgen-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(root: Option<PathBuf>, cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    match cli.command {
        Documents => {
            let mut documents = tmgen::hcl_documents::HclDocuments::default();
            documents.load_directory(&std::env::current_dir()?)?;
            println!("{documents:#?}")
        }
        Config => {
            let root = load(root)?;
            println!("{root:#?}")
        }
    }

    Ok(())
}
