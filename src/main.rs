use anyhow::Result;
use imprint::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run()
}
