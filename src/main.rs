use anyhow::Result;

fn main() -> Result<()> {
    let code = plangate::run()?;
    std::process::exit(code);
}
