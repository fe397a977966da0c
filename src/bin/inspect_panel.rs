use acspanel::history::read_parquet;
use acspanel::schema::arrow::{PLACE_NAME, STATE_FIPS, YEAR};
use acspanel::schema::ID_COLUMNS;
use arrow::array::{Array, Int32Array, StringArray};
use arrow::record_batch::RecordBatch;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::collections::{BTreeMap, BTreeSet};
use std::{env, fs::File, path::Path, process::exit};

/// Large cities every complete panel should contain.
const MAJOR_CITIES: [&str; 5] = ["Los Angeles", "New York", "Chicago", "Houston", "Phoenix"];

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <PANEL_PARQUET>", args[0]);
        exit(1);
    }
    if let Err(e) = inspect_panel(Path::new(&args[1])) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

fn inspect_panel(path: &Path) -> anyhow::Result<()> {
    let reader = SerializedFileReader::new(File::open(path)?)?;
    let meta = reader.metadata();
    let file_size = std::fs::metadata(path)?.len();

    println!("=== Panel: {} ===", path.display());
    println!("Row groups:   {}", meta.num_row_groups());
    println!("File size:    {} bytes", file_size);

    let batch = read_parquet(path)?;
    let variables = batch.num_columns().saturating_sub(ID_COLUMNS.len());
    println!("Rows:         {}", batch.num_rows());
    println!("Columns:      {} ({} variables)", batch.num_columns(), variables);
    println!();

    print_years(&batch)?;
    print_states(&batch)?;
    print_cities(&batch)?;
    Ok(())
}

fn text_column<'a>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("no text column `{}`", name))
}

fn print_years(batch: &RecordBatch) -> anyhow::Result<()> {
    let years = batch
        .column_by_name(YEAR)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow::anyhow!("no Int32 `{}` column", YEAR))?;
    let mut per_year: BTreeMap<i32, usize> = BTreeMap::new();
    for year in years.iter().flatten() {
        *per_year.entry(year).or_default() += 1;
    }
    println!("=== Places per year ===");
    for (year, n) in &per_year {
        println!("  {}  {:>6}", year, n);
    }
    println!();
    Ok(())
}

fn print_states(batch: &RecordBatch) -> anyhow::Result<()> {
    let states = text_column(batch, STATE_FIPS)?;
    let distinct: BTreeSet<&str> = states.iter().flatten().collect();
    println!("States:       {}", distinct.len());
    Ok(())
}

fn print_cities(batch: &RecordBatch) -> anyhow::Result<()> {
    let names = text_column(batch, PLACE_NAME)?;
    println!("=== Major cities ===");
    for city in MAJOR_CITIES {
        let prefix = format!("{} city", city);
        let rows = names
            .iter()
            .flatten()
            .filter(|n| n.starts_with(&prefix))
            .count();
        let mark = if rows > 0 { "ok" } else { "MISSING" };
        println!("  {:<12} {:>3} rows  {}", city, rows, mark);
    }
    let unnamed = names.null_count();
    if unnamed > 0 {
        println!("  ({} rows without a place name)", unnamed);
    }
    Ok(())
}
