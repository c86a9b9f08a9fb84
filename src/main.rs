use clap::Parser;
use log::error;

use hematite::{input, post_processor};

/// Solves a linear static plane stress model described by a JSON input file
#[derive(Parser)]
#[command(name = "hematite", version)]
struct Cli {
    /// Input file with metadata, nodes, elements and boundary conditions
    input_json: String,

    /// Output csv for nodal displacements and forces
    #[arg(long, default_value = "nodes.csv")]
    nodes_output: String,

    /// Output csv for element stresses
    #[arg(long, default_value = "elements.csv")]
    elements_output: String,
}

fn run(cli: &Cli) -> hematite::Result<()> {
    let mut model = input::load(&cli.input_json)?;
    model.step()?;
    post_processor::csv_output(&model, &cli.nodes_output, &cli.elements_output)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        error!("{err}");
        std::process::exit(1)
    }
}
