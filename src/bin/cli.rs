#![cfg(not(tarpaulin_include))]

use prettysheet::packager::OUTPUT_FILE_NAME;
use prettysheet::{PipelineController, Settings, XlsxEngine};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

struct Args {
    input: PathBuf,
    output: PathBuf,
    header_color: Option<String>,
    auto_fit: bool,
    bold: bool,
    styling: bool,
    rows: Option<u32>,
}

fn usage(program: &str) {
    eprintln!(
        "Usage: {} <input.xlsx> [-o <output.xlsx>] [--color #RRGGBB] [--auto-fit] [--no-bold] [--no-styling] [--rows <n>]",
        program
    );
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut input = None;
    let mut output = PathBuf::from(OUTPUT_FILE_NAME);
    let mut header_color = None;
    let mut auto_fit = false;
    let mut bold = true;
    let mut styling = true;
    let mut rows = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                output = iter.next().ok_or("missing value for --output")?.into();
            }
            "--color" => {
                header_color = Some(iter.next().ok_or("missing value for --color")?.clone());
            }
            "--rows" => {
                let value = iter.next().ok_or("missing value for --rows")?;
                rows = Some(value.parse().map_err(|_| format!("invalid row count: {}", value))?);
            }
            "--auto-fit" => auto_fit = true,
            "--no-bold" => bold = false,
            "--no-styling" => styling = false,
            other if other.starts_with('-') => return Err(format!("unknown option: {}", other)),
            other => input = Some(PathBuf::from(other)),
        }
    }

    Ok(Args {
        input: input.ok_or("no input file given")?,
        output,
        header_color,
        auto_fit,
        bold,
        styling,
        rows,
    })
}

fn print_preview(controller: &PipelineController) {
    let Some(preview) = controller.preview() else {
        return;
    };
    println!("{}", preview.headers.join(" | "));
    for row in &preview.rows {
        println!("{}", row.join(" | "));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let raw_args: Vec<String> = env::args().collect();
    let args = match parse_args(&raw_args) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("Error: {}", message);
            usage(&raw_args[0]);
            std::process::exit(2);
        }
    };

    let mut settings = Settings::from_env();
    if let Some(rows) = args.rows {
        settings.row_limit = rows;
    }

    let mut controller = PipelineController::with_engine(Arc::new(XlsxEngine::new()), &settings);
    controller.ingest_file(&args.input).await?;
    print_preview(&controller);

    let dispatched = controller.edit_configuration(|config| {
        if let Some(color) = args.header_color {
            config.header_color = color;
        }
        config.auto_fit_columns = args.auto_fit;
        config.bold_headers = args.bold;
        config.apply_styling = args.styling;
    });
    match dispatched {
        Some(ticket) => controller.run_transform(ticket).await?,
        None => controller.process().await?,
    };

    let written = controller.download()?.save_as(&args.output)?;
    println!("Wrote {} bytes to {}", written, args.output.display());

    Ok(())
}
