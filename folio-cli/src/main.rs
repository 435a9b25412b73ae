use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use folio_core::{Command, Config, DocumentEngine};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Paginated plain-text editor driven by line commands"
)]
struct Args {
    /// Document to open; the built-in welcome document is used when omitted
    file: Option<PathBuf>,

    /// Title for the document (defaults to the file stem)
    #[arg(short = 't', long = "title")]
    title: Option<String>,

    /// Where `save` and auto-save write (defaults to a name derived from the title)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Enable auto-save with the given interval in seconds
    #[arg(long = "autosave", value_name = "SECS", conflicts_with = "no_autosave")]
    autosave: Option<u64>,

    /// Disable auto-save even if the configuration enables it
    #[arg(long = "no-autosave")]
    no_autosave: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Engine(Command),
    Show,
    Edit(String),
    Marks,
    Toc,
    Status,
    Export,
    Save(Option<PathBuf>),
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  show                      print the current page
  page N | next [N] | prev [N]
  edit TEXT                 replace the current page (\\n starts a new line)
  search QUERY | clear
  replace QUERY => REPLACEMENT
  undo | redo
  mark [N] | marks          toggle a bookmark (current page by default), list bookmarks
  toc | status | export
  save [PATH]
  quit";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = Config::project_dirs()?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let mut config = Config::load(&config_path)?;
    if let Some(secs) = args.autosave {
        config.autosave.enabled = true;
        config.autosave.interval_secs = secs;
    }
    if args.no_autosave {
        config.autosave.enabled = false;
    }

    let history = config.history.build();
    let mut engine = match &args.file {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to open {:?}", path))?;
            let title = args
                .title
                .clone()
                .or_else(|| {
                    path.file_stem()
                        .and_then(|s| s.to_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| config.default_title.clone());
            let mut engine = DocumentEngine::new(history);
            engine.load_document(&raw, &title);
            engine
        }
        None => {
            let mut engine = DocumentEngine::with_welcome(history);
            if let Some(title) = &args.title {
                let raw = engine.export_text();
                engine.load_document(&raw, title);
            }
            engine
        }
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(engine.export_file_name()));

    let mut autosave = time::interval(config.autosave.interval());
    autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    autosave.tick().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();
    writeln!(stdout, "{}", format_status_line(&engine))?;
    log_engine_events(&engine);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = match parse_input(&line, engine.current_page()) {
                    Ok(Some(input)) => input,
                    Ok(None) => continue,
                    Err(err) => {
                        writeln!(stdout, "error: {err}")?;
                        continue;
                    }
                };
                if input == Input::Quit {
                    break;
                }
                if let Err(err) = run_input(input, &mut engine, &output, &mut stdout) {
                    writeln!(stdout, "error: {err:#}")?;
                }
                log_engine_events(&engine);
            }
            _ = autosave.tick(), if config.autosave.enabled => {
                match autosave_if_dirty(&mut engine, &output) {
                    Ok(true) => info!(path = ?output, "auto-saved"),
                    Ok(false) => {}
                    Err(err) => warn!(error = %err, "auto-save failed"),
                }
                log_engine_events(&engine);
            }
        }
    }

    if save_on_exit(&mut engine, &output, config.autosave.enabled)? {
        info!(path = ?output, "saved on exit");
    }
    Ok(())
}

/// Returns whether anything was written.
fn autosave_if_dirty(engine: &mut DocumentEngine, output: &Path) -> Result<bool> {
    if !engine.is_dirty() {
        return Ok(false);
    }
    save(engine, output)?;
    Ok(true)
}

fn save_on_exit(engine: &mut DocumentEngine, output: &Path, autosave: bool) -> Result<bool> {
    if !autosave {
        return Ok(false);
    }
    autosave_if_dirty(engine, output)
}

fn log_engine_events(engine: &DocumentEngine) -> usize {
    let events = engine.take_events();
    for event in &events {
        debug!(?event, "engine event");
    }
    events.len()
}

fn parse_input(line: &str, current_page: usize) -> Result<Option<Input>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word {
        "show" => Input::Show,
        "page" | "goto" => Input::Engine(Command::GotoPage {
            page: parse_number(rest)?,
        }),
        "next" | "n" => Input::Engine(Command::NextPage {
            count: parse_count(rest)?,
        }),
        "prev" | "p" => Input::Engine(Command::PrevPage {
            count: parse_count(rest)?,
        }),
        "edit" => Input::Edit(rest.replace("\\n", "\n")),
        "search" | "/" => Input::Engine(Command::Search {
            query: rest.to_string(),
        }),
        "clear" => Input::Engine(Command::ClearSearch),
        "replace" => {
            let (query, replacement) = rest
                .split_once("=>")
                .ok_or_else(|| anyhow!("usage: replace QUERY => REPLACEMENT"))?;
            Input::Engine(Command::ReplaceAll {
                query: query.trim().to_string(),
                replacement: replacement.trim().to_string(),
            })
        }
        "undo" | "u" => Input::Engine(Command::Undo),
        "redo" => Input::Engine(Command::Redo),
        "mark" | "m" => {
            let page = if rest.is_empty() {
                current_page
            } else {
                parse_number(rest)?
            };
            Input::Engine(Command::ToggleBookmark { page })
        }
        "marks" => Input::Marks,
        "toc" => Input::Toc,
        "status" => Input::Status,
        "export" => Input::Export,
        "save" | "w" => Input::Save((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "help" | "?" => Input::Help,
        "quit" | "q" | "exit" => Input::Quit,
        other => bail!("unknown command {:?} (try `help`)", other),
    };
    Ok(Some(input))
}

fn parse_number(raw: &str) -> Result<usize> {
    raw.parse()
        .with_context(|| format!("expected a page number, got {:?}", raw))
}

fn parse_count(raw: &str) -> Result<usize> {
    if raw.is_empty() {
        Ok(1)
    } else {
        parse_number(raw)
    }
}

fn run_input<W: Write>(
    input: Input,
    engine: &mut DocumentEngine,
    output: &Path,
    out: &mut W,
) -> Result<()> {
    match input {
        Input::Engine(command) => {
            engine.apply(command)?;
            writeln!(out, "{}", format_status_line(engine))?;
        }
        Input::Edit(text) => {
            let index = engine.current_page().saturating_sub(1);
            engine.edit_page(index, text)?;
            writeln!(out, "{}", format_status_line(engine))?;
        }
        Input::Show => match engine.current_page_text() {
            Some(text) => writeln!(out, "{text}")?,
            None => writeln!(out, "(empty document)")?,
        },
        Input::Marks => {
            let marks = engine
                .bookmarks()
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, "bookmarks: {}", if marks.is_empty() { "-" } else { marks.as_str() })?;
        }
        Input::Toc => {
            for entry in engine.table_of_contents() {
                let marker = if entry.page_number == engine.current_page() {
                    '>'
                } else {
                    ' '
                };
                writeln!(out, "{marker} {}", entry.title)?;
            }
        }
        Input::Status => {
            writeln!(out, "{}", serde_json::to_string_pretty(&engine.status())?)?;
        }
        Input::Export => writeln!(out, "{}", engine.export_text())?,
        Input::Save(path) => {
            let path = path.as_deref().unwrap_or(output);
            save(engine, path)?;
            writeln!(out, "saved {}", path.display())?;
        }
        Input::Help => writeln!(out, "{HELP}")?,
        Input::Quit => {}
    }
    Ok(())
}

fn save(engine: &mut DocumentEngine, path: &Path) -> Result<()> {
    write_atomically(path, &engine.export_text())?;
    engine.mark_saved();
    Ok(())
}

fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("txt.tmp");
    let result = write_and_rename(&tmp, path, contents);
    if result.is_err() && tmp.exists() {
        if let Err(err) = fs::remove_file(&tmp) {
            warn!(error = %err, path = ?tmp, "failed to remove temp file");
        }
    }
    result
}

fn write_and_rename(tmp: &Path, path: &Path, contents: &str) -> Result<()> {
    let mut file =
        File::create(tmp).with_context(|| format!("failed to open temp file {:?}", tmp))?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    drop(file);
    fs::rename(tmp, path).with_context(|| format!("failed to write {:?}", path))?;
    Ok(())
}

fn format_status_line(engine: &DocumentEngine) -> String {
    let mut status = format!(
        "{} - page {}/{}",
        engine.title(),
        engine.current_page(),
        engine.page_count()
    );
    if engine.is_bookmarked(engine.current_page()) {
        status.push_str(" *");
    }
    if engine.is_dirty() {
        status.push_str(" [modified]");
    }
    if !engine.search_term().is_empty() {
        let summary = engine.search_summary();
        status.push_str(" - /");
        status.push_str(engine.search_term());
        if summary.is_empty() {
            status.push_str(" (no matches)");
        } else {
            status.push_str(&format!(" (pages {summary})"));
        }
    }
    status
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "folio.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    fn parse(line: &str) -> Input {
        parse_input(line, 2).unwrap().unwrap()
    }

    #[test]
    fn parse_input_maps_navigation() {
        assert_eq!(parse("page 3"), Input::Engine(Command::GotoPage { page: 3 }));
        assert_eq!(parse("next"), Input::Engine(Command::NextPage { count: 1 }));
        assert_eq!(parse("prev 4"), Input::Engine(Command::PrevPage { count: 4 }));
        assert!(parse_input("page x", 1).is_err());
        assert!(parse_input("   ", 1).unwrap().is_none());
    }

    #[test]
    fn parse_input_splits_replace_arguments() {
        assert_eq!(
            parse("replace a cat =>  a dog "),
            Input::Engine(Command::ReplaceAll {
                query: "a cat".into(),
                replacement: "a dog".into(),
            })
        );
        assert!(parse_input("replace cat dog", 1).is_err());
    }

    #[test]
    fn parse_input_expands_newlines_in_edit() {
        assert_eq!(parse("edit one\\ntwo"), Input::Edit("one\ntwo".into()));
    }

    #[test]
    fn parse_input_marks_current_page_by_default() {
        assert_eq!(parse("mark"), Input::Engine(Command::ToggleBookmark { page: 2 }));
        assert_eq!(parse("mark 5"), Input::Engine(Command::ToggleBookmark { page: 5 }));
        assert!(parse_input("frobnicate", 1).is_err());
    }

    #[test]
    fn run_input_edits_current_page_and_reports_status() {
        let dir = tempdir().unwrap();
        let mut engine = DocumentEngine::from_text("a\n---\nb", "Doc");
        let mut out = Vec::new();

        run_input(parse("page 2"), &mut engine, dir.path(), &mut out).unwrap();
        run_input(parse("edit changed"), &mut engine, dir.path(), &mut out).unwrap();
        run_input(parse("search CHANGED"), &mut engine, dir.path(), &mut out).unwrap();

        assert_eq!(engine.pages(), ["a", "changed"]);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Doc - page 2/2 [modified] - /CHANGED (pages 2)"));
    }

    #[test]
    fn save_writes_export_and_clears_dirty_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Doc.txt");
        let mut engine = DocumentEngine::from_text("a\n---\nb", "Doc");
        engine.edit_page(0, "first").unwrap();

        save(&mut engine, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\n---\nb");
        assert!(!engine.is_dirty());
        assert!(!dir.path().join("Doc.txt.tmp").exists());
    }

    #[test]
    fn autosave_skips_clean_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Doc.txt");
        let mut engine = DocumentEngine::from_text("a\n---\nb", "Doc");

        assert!(!autosave_if_dirty(&mut engine, &path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn autosave_writes_dirty_documents_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Doc.txt");
        let mut engine = DocumentEngine::from_text("a\n---\nb", "Doc");
        engine.replace_all("B", "c");

        assert!(autosave_if_dirty(&mut engine, &path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\n---\nc");
        assert!(!engine.is_dirty());
        assert!(!autosave_if_dirty(&mut engine, &path).unwrap());
    }

    #[test]
    fn exit_save_follows_autosave_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Doc.txt");
        let mut engine = DocumentEngine::from_text("a", "Doc");
        engine.edit_page(0, "edited").unwrap();

        assert!(!save_on_exit(&mut engine, &path, false).unwrap());
        assert!(!path.exists());
        assert!(engine.is_dirty());

        assert!(save_on_exit(&mut engine, &path, true).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "edited");
        assert!(!engine.is_dirty());
    }

    #[test]
    fn failed_save_removes_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Doc.txt");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("inside"), "occupied").unwrap();
        let mut engine = DocumentEngine::from_text("a", "Doc");
        engine.edit_page(0, "edited").unwrap();

        assert!(save(&mut engine, &path).is_err());
        assert!(!dir.path().join("Doc.txt.tmp").exists());
        assert!(engine.is_dirty());
    }

    #[test]
    fn events_are_drained_after_each_command() {
        let dir = tempdir().unwrap();
        let mut engine = DocumentEngine::from_text("a\n---\nb", "Doc");
        let mut out = Vec::new();
        assert_eq!(log_engine_events(&engine), 1);

        run_input(parse("page 2"), &mut engine, dir.path(), &mut out).unwrap();
        run_input(parse("mark"), &mut engine, dir.path(), &mut out).unwrap();
        assert_eq!(log_engine_events(&engine), 2);
        assert!(engine.events().lock().is_empty());

        run_input(parse("show"), &mut engine, dir.path(), &mut out).unwrap();
        assert_eq!(log_engine_events(&engine), 0);
    }

    #[test]
    fn rejected_edit_surfaces_as_error() {
        let dir = tempdir().unwrap();
        let mut engine = DocumentEngine::from_text("", "Empty");
        let mut out = Vec::new();
        assert!(run_input(parse("edit text"), &mut engine, dir.path(), &mut out).is_err());
    }
}
