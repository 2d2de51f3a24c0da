//! Standalone checker for broadcast CSV files.
//!
//! Reads a CSV file the same way the broadcaster does and reports
//! which rows will be sent, which are skipped, and which images are missing.

use std::process::ExitCode;

use clap::Parser;

use group_broadcaster::config::{IMAGE_COLUMN, MESSAGE_COLUMN, RowReader};

/// Broadcast CSV validator.
#[derive(Parser, Debug)]
#[command(name = "validate_rows")]
#[command(about = "Checks a broadcast CSV file without connecting to Telegram")]
#[command(version)]
struct Args {
    /// Path to the CSV file to validate.
    #[arg(short, long, default_value = "messages.csv")]
    file: String,

    /// Write an example CSV file at the specified path.
    #[arg(long)]
    generate_example: Option<String>,

    /// Show every row, not just problems.
    #[arg(short, long)]
    verbose: bool,
}

const EXAMPLE_CSV: &str = "message,image\n\
\"**Hello everyone!** Welcome to the weekly update.\",\n\
\"Check out our new banner, details in the __pinned__ message\",banner.png\n\
\"See you next week 👋\",\n";

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(output_path) = args.generate_example {
        return generate_example(&output_path);
    }

    validate_rows(&args.file, args.verbose)
}

fn generate_example(output_path: &str) -> ExitCode {
    match std::fs::write(output_path, EXAMPLE_CSV) {
        Ok(()) => {
            println!("✓ Example CSV written to: {output_path}");
            println!("\nColumns: '{MESSAGE_COLUMN}' (markdown text), '{IMAGE_COLUMN}' (optional file path).");
            println!("Rows with an empty message are skipped.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Failed to write example file: {e}");
            ExitCode::FAILURE
        }
    }
}

fn validate_rows(path: &str, verbose: bool) -> ExitCode {
    println!("Validating: {path}\n");

    let mut reader = match RowReader::open(path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("✗ Failed to open CSV: {e}");
            return ExitCode::FAILURE;
        }
    };

    if !reader.has_image_column() {
        println!("⚠ No '{IMAGE_COLUMN}' column: every row will be sent as text\n");
    }

    let mut errors = 0;
    let mut with_image = 0;
    let mut missing_images = 0;
    let mut valid = 0;

    for result in reader.by_ref() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                errors += 1;
                println!("  ✗ Error: {e}");
                continue;
            }
        };
        valid += 1;

        if verbose {
            println!("[line {}] \"{}\"", row.line, truncate(&row.message, 40));
        }

        match (&row.image, row.attachment()) {
            (Some(_), Some(found)) => {
                with_image += 1;
                if verbose {
                    println!("  ✓ Image: {}", found.display());
                }
            }
            (Some(missing), None) => {
                missing_images += 1;
                println!(
                    "  ⚠ Line {}: image {} not found, will be sent as text",
                    row.line,
                    missing.display()
                );
            }
            (None, _) => {
                if verbose {
                    println!("  ✓ Text only");
                }
            }
        }
    }

    println!();

    let skipped = reader.skipped();
    println!("Rows to send:        {valid}");
    println!("  with image:        {with_image}");
    println!("  image missing:     {missing_images}");
    println!("Blank rows skipped:  {skipped}");

    if errors == 0 {
        println!("\n✓ CSV is valid!");
        ExitCode::SUCCESS
    } else {
        println!("\n✗ Validation failed: {errors} malformed record(s)");
        ExitCode::FAILURE
    }
}

/// Truncates a string for display.
fn truncate(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", chars[..max_len].iter().collect::<String>())
    }
}
