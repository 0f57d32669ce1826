//! `headtag` command line tool.
//!
//! Pushes each head description file as one entry, resolves them and prints
//! the server-rendered result:
//!
//! ```text
//! headtag render base.yaml page.json --config head.yaml
//! headtag render untrusted.json --safe --format json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::executor::block_on;
use headtag::{Head, HeadConfig, HeadOptions, Input, RuntimeMode, SsrHead};
use headtag_render::{render_ssr_head_with, SsrOptions};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Resolve document head descriptions and render them as HTML.
#[derive(Parser)]
#[command(name = "headtag")]
#[command(version)]
struct Cli {
    /// Log pipeline activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render head description files (JSON or YAML), pushed in order
    Render(RenderArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// A complete HTML document skeleton
    Html,
    /// The rendered fragments as a JSON object
    Json,
}

#[derive(Debug, Args)]
struct RenderArgs {
    /// Entry files; `.json` is read as JSON, anything else as YAML
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Head configuration (default mode, separator, initial entries)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Html)]
    format: Format,

    /// Default entry mode; defaults to the config's mode, then `server`
    #[arg(long)]
    mode: Option<RuntimeMode>,

    /// Push entries through the safe whitelist
    #[arg(long)]
    safe: bool,

    /// Do not embed the template payload script
    #[arg(long)]
    no_payload: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "headtag=debug,headtag_render=debug"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_input(path: &Path) -> Result<Input> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("parsing {} as JSON", path.display()))?,
        _ => serde_yaml::from_str(&text)
            .with_context(|| format!("parsing {} as YAML", path.display()))?,
    };
    Input::from_json(value).with_context(|| format!("invalid head description in {}", path.display()))
}

fn render(args: &RenderArgs) -> Result<String> {
    let mut options = match &args.config {
        Some(path) => {
            let config = HeadConfig::from_path(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            HeadOptions::from_config(&config)?
        }
        None => HeadOptions::new(),
    };
    options.mode = Some(args.mode.or(options.mode).unwrap_or(RuntimeMode::Server));

    let head = Head::with_options(options);
    for path in &args.files {
        let input = load_input(path)?;
        let entry = if args.safe {
            head.push_safe(input)
        } else {
            head.push(input)
        };
        debug!(file = %path.display(), entry = entry.id(), "pushed entry");
    }

    let ssr = SsrOptions {
        payload: !args.no_payload,
        ..SsrOptions::default()
    };
    let html = block_on(render_ssr_head_with(&head, &ssr))?;
    match args.format {
        Format::Html => Ok(document_html(&html)),
        Format::Json => Ok(serde_json::to_string_pretty(&html)?),
    }
}

fn document_html(html: &SsrHead) -> String {
    let mut out = String::from("<!DOCTYPE html>\n");
    out.push_str(&format!("<html{}>\n<head>\n", html.html_attrs));
    push_fragment(&mut out, &html.head_tags);
    out.push_str(&format!("</head>\n<body{}>\n", html.body_attrs));
    push_fragment(&mut out, &html.body_tags_open);
    push_fragment(&mut out, &html.body_tags);
    out.push_str("</body>\n</html>");
    out
}

fn push_fragment(out: &mut String, fragment: &str) {
    if !fragment.is_empty() {
        out.push_str(fragment);
        out.push('\n');
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = match &cli.command {
        Command::Render(args) => render(args)?,
    };
    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn args(files: Vec<PathBuf>) -> RenderArgs {
        RenderArgs {
            files,
            config: None,
            format: Format::Html,
            mode: None,
            safe: false,
            no_payload: false,
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_render_args() {
        let cli = Cli::try_parse_from([
            "headtag", "render", "a.yaml", "b.json", "--mode", "client", "--safe", "-f", "json",
        ])
        .unwrap();
        let Command::Render(args) = cli.command;
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.mode, Some(RuntimeMode::Client));
        assert_eq!(args.format, Format::Json);
        assert!(args.safe);
    }

    #[test]
    fn test_render_yaml_and_json_files() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.yaml", "title: Home\nmeta:\n  - charset: utf-8\n");
        let b = write(&dir, "b.json", r#"{"htmlAttrs": {"lang": "en"}}"#);

        let out = render(&args(vec![a, b])).unwrap();
        assert_eq!(
            out,
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Home</title>\n</head>\n<body>\n</body>\n</html>"
        );
    }

    #[test]
    fn test_config_supplies_template_and_separator() {
        let dir = TempDir::new().unwrap();
        let config = write(
            &dir,
            "head.yaml",
            "separator: \"-\"\ninit:\n  - titleTemplate: \"%s %separator Site\"\n",
        );
        let page = write(&dir, "page.yaml", "title: Docs\n");

        let mut render_args = args(vec![page]);
        render_args.config = Some(config);
        render_args.no_payload = true;
        let out = render(&render_args).unwrap();
        assert!(out.contains("<title>Docs - Site</title>"));
        assert!(!out.contains("application/json"));
    }

    #[test]
    fn test_safe_drops_scripts() {
        let dir = TempDir::new().unwrap();
        let page = write(
            &dir,
            "page.json",
            r#"{"title": "Safe", "script": [{"src": "https://evil.example/x.js"}]}"#,
        );

        let mut render_args = args(vec![page]);
        render_args.safe = true;
        render_args.format = Format::Json;
        let out = render(&render_args).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["headTags"], "<title>Safe</title>");
    }

    #[test]
    fn test_client_mode_renders_nothing() {
        let dir = TempDir::new().unwrap();
        let page = write(&dir, "page.yaml", "title: Later\n");

        let mut render_args = args(vec![page]);
        render_args.mode = Some(RuntimeMode::Client);
        render_args.format = Format::Json;
        let out = render(&render_args).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["headTags"], "");
    }

    #[test]
    fn test_non_object_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let page = write(&dir, "page.json", "[1, 2]");
        let err = render(&args(vec![page])).unwrap_err();
        assert!(err.to_string().contains("invalid head description"));
    }
}
