use clap::Subcommand;
use phasecount_core::Config;

#[derive(Subcommand)]
pub enum PresetAction {
    /// List configured presets
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one preset as JSON
    Show {
        /// Preset name
        name: String,
    },
}

pub fn run(action: PresetAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    match action {
        PresetAction::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config.presets)?);
                return Ok(());
            }
            if config.presets.is_empty() {
                println!("No presets configured.");
            }
            for preset in &config.presets {
                let total = preset.total_secs()?;
                println!(
                    "{}\t{} phases\t{}s\t{}",
                    preset.name,
                    preset.phases.len(),
                    total,
                    preset.description
                );
            }
        }
        PresetAction::Show { name } => {
            let preset = config.preset(&name)?;
            println!("{}", serde_json::to_string_pretty(preset)?);
        }
    }
    Ok(())
}
