use anyhow::Result;

fn main() -> Result<()> {
    cleanshift_cli::run_cli()
}
