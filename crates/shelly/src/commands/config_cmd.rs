//! Config subcommand handlers.

use shelly_config::{Config, DEFAULT_ACCOUNT};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

const REDACTED: &str = "********";

// ── Helpers ─────────────────────────────────────────────────────────

/// Map an interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Hide plaintext passwords before printing.
fn redact(cfg: &mut Config) {
    if cfg.credentials.password.is_some() {
        cfg.credentials.password = Some(REDACTED.into());
    }
    for device in &mut cfg.devices {
        if device.password.is_some() {
            device.password = Some(REDACTED.into());
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => {
            let path = util::config_file(global);
            if path.exists() && !force {
                return Err(CliError::Validation {
                    field: "config".into(),
                    reason: format!("{} already exists (use --force to overwrite)", path.display()),
                });
            }
            shelly_config::save_config_to(&Config::default(), &path)?;
            if !global.quiet {
                eprintln!("Wrote {}", path.display());
                eprintln!("Add devices with: shelly discover --save");
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = util::load_config(global)?;
            redact(&mut cfg);
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)
                    .map_err(|e| CliError::Render(e.to_string()))?,
                format => output::render_single(format, &cfg, |_| String::new(), |_| String::new())?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&util::config_file(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::SetPassword { device } => {
            let account = device.as_deref().unwrap_or(DEFAULT_ACCOUNT);
            let password = rpassword::prompt_password(format!("Password for {account}: "))
                .map_err(prompt_err)?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }
            shelly_config::store_password(account, &password)?;
            if !global.quiet {
                eprintln!("✓ Password for {account} stored in system keyring");
            }
            Ok(())
        }
    }
}
