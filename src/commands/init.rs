use anyhow::{bail, Result};
use seo_crawl::config::Config;
use std::path::Path;

pub fn init_config(path: &Path, force: bool) -> Result<()> {
    let config_path = path.join("seo-crawl.toml");
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let toml_content = format!(
        "# seo-crawl configuration\n#\n# Environment overrides: BROWSER_EXECUTABLE_PATH, TIER_BASED_RENDERING\n\n{}",
        Config::default().to_toml()?
    );

    std::fs::create_dir_all(path)?;
    std::fs::write(&config_path, toml_content)?;
    println!("Created configuration file: {}", config_path.display());

    Ok(())
}
