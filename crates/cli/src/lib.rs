use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use doc_export::{export_flow, export_table, TableExportConfig};
use doc_model::{FontFamily, RgbColor, TextStyle};
use pdf_engine::{
    to_document_space, DocumentSession, EditOutcome, EditTarget, Point, RenderedSize,
    SessionOptions, WordSpan, Zoom,
};
use serde::Serialize;
use simplelog::{Config, LevelFilter, WriteLogger};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use storage::Storage;

#[derive(Debug, Parser)]
#[command(name = "pdfedit")]
#[command(about = "Inspect and edit the text of PDF documents")]
pub struct Cli {
    /// Directory holding preferences; the platform data directory when unset.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Increase log output on stderr (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render a page to PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Zoom factor; the preferred initial zoom when unset.
        #[arg(long)]
        zoom: Option<f32>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the words of a page with their boxes.
    Words {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Search a page for text.
    Find {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        query: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Match whole words exactly instead of substrings.
        #[arg(long)]
        exact: bool,
    },
    /// Replace every occurrence of a word on a page.
    Replace {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        old: String,
        new: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Keep the font, size and colour of the replaced text.
        #[arg(long, conflicts_with_all = ["font", "size", "color"])]
        preserve_style: bool,
        #[command(flatten)]
        style: StyleArgs,
        #[arg(long)]
        output: PathBuf,
    },
    /// Delete every occurrence of a word on a page.
    Delete {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        text: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        output: PathBuf,
    },
    /// Highlight every occurrence of a word on a page.
    Highlight {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        text: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        output: PathBuf,
    },
    /// Insert text with its baseline at a point, in points from the top left.
    Insert {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        text: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        x: f32,
        #[arg(long)]
        y: f32,
        #[command(flatten)]
        style: StyleArgs,
        #[arg(long)]
        output: PathBuf,
    },
    /// Edit the word under a pixel of the rendered page, or add text there.
    EditAt {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        text: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        x: f32,
        #[arg(long)]
        y: f32,
        /// Zoom the pixel coordinates were taken at.
        #[arg(long, default_value_t = 1.0)]
        zoom: f32,
        #[arg(long)]
        output: PathBuf,
    },
    /// Remove a page.
    RemovePage {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        page: usize,
        #[arg(long)]
        output: PathBuf,
    },
    /// Rotate one page, or every page when --page is omitted.
    Rotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(allow_negative_numbers = true)]
        degrees: i64,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Export the document text.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportFormat::Flow)]
        format: ExportFormat,
        /// Destination file; stdout when unset.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct StyleArgs {
    /// Font family for new text.
    #[arg(long)]
    font: Option<String>,
    /// Font size in points.
    #[arg(long)]
    size: Option<f32>,
    /// Colour as a name, #RRGGBB or r,g,b.
    #[arg(long)]
    color: Option<String>,
}

impl StyleArgs {
    fn is_empty(&self) -> bool {
        self.font.is_none() && self.size.is_none() && self.color.is_none()
    }

    fn apply(&self, base: TextStyle) -> Result<TextStyle> {
        let mut style = base;
        if let Some(font) = &self.font {
            style = style.with_family(FontFamily::from_name(font));
        }
        if let Some(size) = self.size {
            style = style.with_size(size);
        }
        if let Some(color) = &self.color {
            let color: RgbColor = color.parse().context("invalid --color")?;
            style = style.with_color(color);
        }
        Ok(style)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportFormat {
    Flow,
    Table,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: usize,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    number: usize,
    width: f32,
    height: f32,
    rotation: u16,
}

#[derive(Debug, Serialize)]
struct SpanOutput {
    text: String,
    block: usize,
    line: usize,
    word: usize,
    bbox: [f32; 4],
}

impl From<WordSpan> for SpanOutput {
    fn from(span: WordSpan) -> Self {
        Self {
            text: span.text,
            block: span.block_index,
            line: span.line_index,
            word: span.word_index,
            bbox: [span.bbox.x0, span.bbox.y0, span.bbox.x1, span.bbox.y1],
        }
    }
}

#[derive(Debug, Serialize)]
struct EditOutput {
    outcome: &'static str,
    matches: usize,
    revision: u64,
    output: String,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    let data_dir = cli.data_dir.as_deref();
    match cli.command {
        Commands::Info { file } => run_info(data_dir, &file),
        Commands::Render { file, page, zoom, output } => {
            run_render(data_dir, &file, page, zoom, output.as_deref())
        }
        Commands::Words { file, page } => {
            let session = open_session(data_dir, &file)?;
            print_spans(session.words(page_index(page)?)?)
        }
        Commands::Find { file, query, page, exact } => {
            let session = open_session(data_dir, &file)?;
            let index = page_index(page)?;
            let spans =
                if exact { session.find_exact(index, &query)? } else { session.search(index, &query)? };
            print_spans(spans)
        }
        Commands::Replace { file, old, new, page, preserve_style, style, output } => {
            let mut session = open_session(data_dir, &file)?;
            let index = page_index(page)?;
            let outcome = if preserve_style {
                session.replace_text_preserving_style(index, &old, &new)?
            } else {
                let style = if style.is_empty() { None } else { Some(style.apply(session.style())?) };
                session.replace_text(index, &old, &new, style)?
            };
            finish_edit(&session, outcome, &output)
        }
        Commands::Delete { file, text, page, output } => {
            let mut session = open_session(data_dir, &file)?;
            let outcome = session.delete_text(page_index(page)?, &text)?;
            finish_edit(&session, outcome, &output)
        }
        Commands::Highlight { file, text, page, output } => {
            let mut session = open_session(data_dir, &file)?;
            let outcome = session.add_highlight(page_index(page)?, &text)?;
            finish_edit(&session, outcome, &output)
        }
        Commands::Insert { file, text, page, x, y, style, output } => {
            let mut session = open_session(data_dir, &file)?;
            let style = style.apply(session.style())?;
            let outcome =
                session.insert_text_at(page_index(page)?, Point::new(x, y), &text, Some(style))?;
            finish_edit(&session, outcome, &output)
        }
        Commands::EditAt { file, text, page, x, y, zoom, output } => {
            run_edit_at(data_dir, &file, &text, page, Point::new(x, y), zoom, &output)
        }
        Commands::RemovePage { file, page, output } => {
            let mut session = open_session(data_dir, &file)?;
            let outcome = session.remove_page(page_index(page)?)?;
            finish_edit(&session, outcome, &output)
        }
        Commands::Rotate { file, degrees, page, output } => {
            let mut session = open_session(data_dir, &file)?;
            let outcome = match page {
                Some(page) => session.rotate_page(page_index(page)?, degrees)?,
                None => session.rotate_all_pages(degrees)?,
            };
            finish_edit(&session, outcome, &output)
        }
        Commands::Export { file, format, output } => {
            run_export(data_dir, &file, format, output.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    // A logger may already be installed when `run` is called twice in one process.
    let _ = WriteLogger::init(level, Config::default(), std::io::stderr());
}

fn open_session(data_dir: Option<&Path>, file: &Path) -> Result<DocumentSession> {
    ensure_pdf_exists(file)?;

    let storage = match data_dir {
        Some(dir) => Storage::with_root(dir),
        None => Storage::from_default_project()?,
    };
    let preferences = storage.load_preferences().context("failed to load preferences")?;
    let mut options =
        SessionOptions::from_preferences(&preferences).context("invalid preferences")?;
    if options.working_root.is_none() {
        options.working_root = Some(storage.working_root());
    }

    DocumentSession::open_with(file, options).context("failed to open PDF")
}

fn page_index(page: usize) -> Result<usize> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    Ok(page - 1)
}

fn run_info(data_dir: Option<&Path>, file: &Path) -> Result<()> {
    let session = open_session(data_dir, file)?;

    let page_count = session.page_count()?;
    let pages = (0..page_count)
        .map(|index| -> Result<PageOutput> {
            let size = session.page_size(index)?;
            Ok(PageOutput {
                number: index + 1,
                width: size.width_pt,
                height: size.height_pt,
                rotation: session.page_rotation(index)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let payload = InfoOutput { path: file.display().to_string(), page_count, pages };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_render(
    data_dir: Option<&Path>,
    file: &Path,
    page: usize,
    zoom: Option<f32>,
    output: Option<&Path>,
) -> Result<()> {
    let session = open_session(data_dir, file)?;
    let index = page_index(page)?;
    let zoom = match zoom {
        Some(value) => Zoom::new(value)?,
        None => session.zoom(),
    };

    let raster = session.render_at(index, zoom).context("failed to render page")?;
    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(file, page));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    raster
        .into_image()
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;
    println!("{}", output.display());
    Ok(())
}

fn run_edit_at(
    data_dir: Option<&Path>,
    file: &Path,
    text: &str,
    page: usize,
    device: Point,
    zoom: f32,
    output: &Path,
) -> Result<()> {
    let mut session = open_session(data_dir, file)?;
    let index = page_index(page)?;
    let zoom = Zoom::new(zoom)?;
    let size = session.page_size(index)?;
    let rendered = RenderedSize {
        width_px: size.width_pt * zoom.value(),
        height_px: size.height_pt * zoom.value(),
    };
    let point = to_document_space(device, rendered, size)?;

    let target = session.edit_at(index, point)?;
    match &target {
        EditTarget::Existing { span, .. } => log::info!("editing {:?}", span.text),
        EditTarget::NewText { point, .. } => {
            log::info!("adding text at ({:.1}, {:.1})", point.x, point.y)
        }
    }
    let outcome = session.commit_edit(&target, text)?;
    finish_edit(&session, outcome, output)
}

fn run_export(
    data_dir: Option<&Path>,
    file: &Path,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let session = open_session(data_dir, file)?;
    let mut sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };

    match format {
        ExportFormat::Flow => {
            export_flow(&session, &mut sink)?;
        }
        ExportFormat::Table => {
            export_table(&session, &mut sink, &TableExportConfig::default())?;
        }
    }
    Ok(())
}

fn print_spans(spans: Vec<WordSpan>) -> Result<()> {
    let spans: Vec<SpanOutput> = spans.into_iter().map(SpanOutput::from).collect();
    println!("{}", serde_json::to_string_pretty(&spans)?);
    Ok(())
}

/// Writes the working copy to `output` whatever the outcome, so a `not_found`
/// or `unchanged` edit still leaves an unmodified copy of the input there.
fn finish_edit(session: &DocumentSession, outcome: EditOutcome, output: &Path) -> Result<()> {
    session
        .save_as(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    let (outcome, matches) = match outcome {
        EditOutcome::Applied { matches } => ("applied", matches),
        EditOutcome::NotFound => ("not_found", 0),
        EditOutcome::Unchanged => ("unchanged", 0),
    };
    let payload = EditOutput {
        outcome,
        matches,
        revision: session.revision(),
        output: output.display().to_string(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_render_output(file: &Path, page: usize) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
