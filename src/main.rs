fn main() -> anyhow::Result<()> {
    stagerouter::cli::run_cli()
}
