use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use column_catalog::catalog::ColumnFilter;
use column_catalog::engine::{ColumnCatalog, Scope};
use column_catalog::export::{export_csv, export_json};
use column_catalog::parser::Format;
use column_catalog::ui::App;

#[derive(Parser, Debug)]
#[command(name = "column-catalog")]
#[command(about = "Column Catalog - search and summarize structural columns from IFC or JSON")]
#[command(version)]
struct Args {
    /// Path to IFC or JSON file
    #[arg(required = true)]
    file: PathBuf,

    /// Input format (json, ifc, or a content type); defaults to the file extension
    #[arg(long)]
    format: Option<String>,

    /// Only keep columns whose name, type, level or material contains TERM
    #[arg(long, value_name = "TERM")]
    search: Option<String>,

    /// Only keep columns on this level
    #[arg(long)]
    level: Option<String>,

    /// Print summary statistics as JSON
    #[arg(long)]
    stats: bool,

    /// Print the matching columns as a table
    #[arg(long)]
    list: bool,

    /// Export matching columns to CSV
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Export matching columns to JSON
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();
    let args = Args::parse();

    let format = args
        .format
        .as_deref()
        .map(str::parse::<Format>)
        .transpose()?;

    let catalog = Arc::new(ColumnCatalog::new());
    let summary = catalog.load_path(&args.file, format)?;

    let mut filter = ColumnFilter::term(args.search.clone().unwrap_or_default());
    if let Some(level) = &args.level {
        filter = filter.with_level(level.clone());
    }
    let matches = catalog.set_filter(filter);

    if args.list {
        for column in &matches {
            println!(
                "{}\t{}\t{}\t{}\t{:.0}\t{}",
                column.id(),
                column.name(),
                column.shape(),
                column.level_label(),
                column.height(),
                column.material()
            );
        }
    }

    if args.stats {
        let report = serde_json::json!({
            "all": catalog.stats(Scope::All),
            "filtered": catalog.stats(Scope::Filtered),
            "skipped": summary.warnings.len(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if let Some(csv_path) = &args.csv {
        export_csv(&matches, csv_path)?;
        println!("Exported to CSV: {}", csv_path.display());
    }

    if let Some(json_path) = &args.json {
        export_json(&matches, json_path)?;
        println!("Exported to JSON: {}", json_path.display());
    }

    if args.list || args.stats || args.csv.is_some() || args.json.is_some() {
        return Ok(());
    }

    let status = format!(
        "{} loaded, {} skipped",
        summary.record_count,
        summary.warnings.len()
    );
    let source = args
        .file
        .file_name()
        .map_or_else(|| args.file.display().to_string(), |n| n.to_string_lossy().to_string());

    let terminal = ratatui::init();
    let result = App::new(catalog, source)
        .with_filter(args.search.unwrap_or_default(), args.level.as_deref())
        .with_status(status)
        .run(terminal);
    ratatui::restore();
    result
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
