use anyhow::Result;

fn main() -> Result<()> {
    snekbox::cli::run()
}
