use anyhow::{bail, Context as _, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use weave_engine::{Context, Template, Value};
use weave_parser::parser::is_identifier;

#[derive(Parser)]
#[command(name = "weave")]
#[command(about = "Weave template engine")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a template to stdout
    Render {
        /// Template file
        path: PathBuf,

        /// JSON file holding the context object
        #[arg(short, long, value_name = "FILE")]
        context: Option<PathBuf>,

        /// Set a context variable; VALUE is read as JSON, else as a string
        #[arg(short, long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, Value)>,

        /// Compile the template first and execute the compiled form
        #[arg(long)]
        compiled: bool,
    },

    /// Check a template for errors without rendering it
    Check {
        /// Template file
        path: PathBuf,
    },

    /// Print the compiled operation listing and the variables a template reads
    Compile {
        /// Template file
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Render {
            path,
            context,
            set,
            compiled,
        } => cmd_render(&path, context.as_deref(), set, compiled),
        Command::Check { path } => cmd_check(&path),
        Command::Compile { path } => cmd_compile(&path),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn read_template(path: &Path) -> Result<Template> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    log::info!("read {} bytes from {}", source.len(), path.display());

    let template = Template::parse(&source)
        .with_context(|| format!("Failed to parse template {}", path.display()))?;
    Ok(template)
}

fn load_context(path: Option<&Path>, assignments: Vec<(String, Value)>) -> Result<Context> {
    let mut context = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read context file {}", path.display()))?;
            serde_json::from_str::<Context>(&text).with_context(|| {
                format!("Context file {} is not a JSON object", path.display())
            })?
        }
        None => Context::new(),
    };

    for (name, value) in assignments {
        log::debug!("set {name} = {value}");
        context.insert(name, value);
    }
    Ok(context)
}

/// Parse a `--set NAME=VALUE` argument.
fn parse_assignment(arg: &str) -> Result<(String, Value), String> {
    let Some((name, raw)) = arg.split_once('=') else {
        return Err(format!("expected NAME=VALUE, got '{arg}'"));
    };
    let name = name.trim();
    if !is_identifier(name) {
        return Err(format!("'{name}' is not a valid variable name"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

fn cmd_render(
    path: &Path,
    context_path: Option<&Path>,
    assignments: Vec<(String, Value)>,
    compiled: bool,
) -> Result<()> {
    let template = read_template(path)?;
    let context = load_context(context_path, assignments)?;

    let output = if compiled {
        log::info!("rendering compiled form");
        template.compile().execute(&context)
    } else {
        template.render(&context)
    }
    .with_context(|| format!("Failed to render {}", path.display()))?;

    print!("{output}");
    Ok(())
}

fn cmd_check(path: &Path) -> Result<()> {
    let template = read_template(path)?;
    let problems = template.compile().problems();

    for problem in &problems {
        eprintln!("{}: {problem}", path.display());
    }
    if !problems.is_empty() {
        bail!("{} problem(s) in {}", problems.len(), path.display());
    }

    eprintln!("OK: {}", path.display());
    Ok(())
}

fn cmd_compile(path: &Path) -> Result<()> {
    let compiled = read_template(path)?.compile();

    print!("{compiled}");
    println!("variables: {}", compiled.variables().join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_assignment_json_values() {
        assert_eq!(
            parse_assignment("age=36").unwrap(),
            ("age".to_string(), Value::Number(36.0))
        );
        assert_eq!(
            parse_assignment("flag=true").unwrap(),
            ("flag".to_string(), Value::Bool(true))
        );
        assert_eq!(
            parse_assignment("xs=[1, \"a\"]").unwrap(),
            (
                "xs".to_string(),
                Value::Seq(vec![Value::Number(1.0), Value::from("a")])
            )
        );
    }

    #[test]
    fn test_assignment_falls_back_to_string() {
        assert_eq!(
            parse_assignment("name=Ada").unwrap(),
            ("name".to_string(), Value::from("Ada"))
        );
        assert_eq!(
            parse_assignment("eq=a=b").unwrap(),
            ("eq".to_string(), Value::from("a=b"))
        );
        assert_eq!(
            parse_assignment("empty=").unwrap(),
            ("empty".to_string(), Value::from(""))
        );
    }

    #[test]
    fn test_assignment_errors() {
        assert!(parse_assignment("no-equals").is_err());
        assert!(parse_assignment("1bad=x").is_err());
        assert!(parse_assignment("a.b=x").is_err());
    }

    #[test]
    fn test_assignments_override_context_file() {
        let dir = std::env::temp_dir().join(format!("weave-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("context.json");
        std::fs::write(&file, r#"{ "name": "file", "keep": 1 }"#).unwrap();

        let context =
            load_context(Some(&file), vec![("name".into(), Value::from("flag"))]).unwrap();
        assert_eq!(context.get("name"), Some(&Value::from("flag")));
        assert_eq!(context.get("keep"), Some(&Value::Number(1.0)));

        std::fs::write(&file, "[1, 2]").unwrap();
        assert!(load_context(Some(&file), Vec::new()).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
