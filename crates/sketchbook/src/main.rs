mod bootstrap;
mod cli;
mod export;
mod paths;
mod run;
mod sketches;

fn main() -> anyhow::Result<()> {
    let cli = cli::parse();
    run::run(cli)
}
