fn main() -> anyhow::Result<()> {
    snapcycle::cli::run()
}
