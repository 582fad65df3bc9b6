mod cli;
mod size;

fn main() -> miette::Result<()> {
    cli::execute()
}
