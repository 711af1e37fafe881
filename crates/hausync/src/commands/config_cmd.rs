//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

/// Profile the command applies to: `--profile`, the file's default, or
/// `default`.
fn target_profile(global: &GlobalOpts, cfg: &hausync_config::Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "password".into(),
        reason: format!("prompt failed: {e}"),
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let mut cfg = hausync_config::load_config()?;
            for profile in cfg.profiles.values_mut() {
                if profile.password.is_some() {
                    profile.password = Some(REDACTED.into());
                }
            }

            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)
                    .map_err(|e| CliError::Render(e.to_string()))?,
                OutputFormat::Json => output::render_json(&cfg, false)?,
                OutputFormat::JsonCompact => output::render_json(&cfg, true)?,
                OutputFormat::Yaml => output::render_yaml(&cfg)?,
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", hausync_config::config_path().display());
            Ok(())
        }

        ConfigCommand::SetPassword { plaintext } => {
            let mut cfg = hausync_config::load_config()?;
            let name = target_profile(global, &cfg);

            let password = rpassword::prompt_password(format!("Password for '{name}': "))
                .map_err(prompt_err)?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }

            if plaintext {
                cfg.profiles.entry(name.clone()).or_default().password = Some(password);
                hausync_config::save_config(&cfg)?;
                if !global.quiet {
                    eprintln!(
                        "Password for '{name}' written to {}",
                        hausync_config::config_path().display()
                    );
                }
            } else {
                hausync_config::store_password(&name, &password)?;
                if !global.quiet {
                    eprintln!("Password for '{name}' stored in the system keyring");
                }
            }
            Ok(())
        }
    }
}
