//! Chain template commands for CLI.

use anchorplan_core::Config;
use clap::Subcommand;

use super::CommandResult;

#[derive(Subcommand)]
pub enum TemplateAction {
    /// List chain templates by anchor type
    List,
    /// Show one template as JSON
    Show {
        /// Anchor type (e.g. "lecture")
        anchor_type: String,
    },
}

pub fn run(action: TemplateAction) -> CommandResult {
    let config = Config::load_or_default();
    let registry = config.template_registry()?;

    match action {
        TemplateAction::List => {
            let mut templates: Vec<_> = registry.templates().collect();
            templates.sort_by(|a, b| a.anchor_type.cmp(&b.anchor_type));
            for template in templates {
                println!(
                    "{:<12} {:>2} steps {:>4} min",
                    template.anchor_type,
                    template.steps.len(),
                    template.total_minutes()
                );
            }
        }
        TemplateAction::Show { anchor_type } => {
            let key = anchor_type.trim().to_ascii_lowercase();
            let template = registry
                .get(&key)
                .ok_or_else(|| format!("unknown template: {anchor_type}"))?;
            println!("{}", serde_json::to_string_pretty(template)?);
        }
    }
    Ok(())
}
