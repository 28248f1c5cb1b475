#[path = "mailprobe-cli/args.rs"]
mod args;
#[cfg(all(feature = "with-mx", feature = "with-smtp-probe"))]
#[path = "mailprobe-cli/deliverability.rs"]
mod deliverability;
#[cfg(feature = "with-mx")]
#[path = "mailprobe-cli/mx.rs"]
mod mx;
#[path = "mailprobe-cli/output.rs"]
mod output;
#[cfg(feature = "with-smtp-probe")]
#[path = "mailprobe-cli/verify.rs"]
mod verify;

use anyhow::{Context, Result};
use args::{Cli, Commands, mode_from_str, spec_options_from_profile};
use mailprobe_lib::{SpecOptions, ValidationMode, normalize_email, normalize_email_with_spec};
use output::{OutputRow, any_invalid, make_row, write_reports, write_spec_json};

use std::io::{self, BufRead};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut mode = cli.parsed_mode();
    let mut rows = Vec::new();

    let spec_requested = cli.spec_requested();
    let mut spec_options = if spec_requested {
        Some(spec_options_from_profile(&cli.spec_profile)?)
    } else {
        None
    };

    if let Some(ref mut opts) = spec_options {
        if cli.ascii_hint {
            opts.ascii_hint = true;
        }
    }

    #[cfg(feature = "with-smtp-probe")]
    if let Some(Commands::VerifyExists {
        email,
        format,
        mail_from,
        mx_hosts,
        port,
        no_catchall_probe,
        catchall_is_valid,
        greylist_is_valid,
        no_comm_is_valid,
        no_conn_is_valid,
        timeout_ms,
    }) = &cli.cmd
    {
        return verify::run_verify_exists(verify::VerifyConfig {
            email,
            format,
            mail_from: mail_from.as_deref(),
            mx_hosts,
            port: *port,
            no_catchall_probe: *no_catchall_probe,
            catchall_is_valid: *catchall_is_valid,
            greylist_is_valid: *greylist_is_valid,
            no_comm_is_valid: *no_comm_is_valid,
            no_conn_is_valid: *no_conn_is_valid,
            timeout_ms: *timeout_ms,
        });
    }

    if cli.stdin {
        collect_from_stdin(&cli, mode, &mut rows, spec_options.as_ref())?;
    } else if let Some(Commands::Validate {
        mode: sub_mode,
        email,
    }) = &cli.cmd
    {
        if let Some(selected) = sub_mode.as_deref() {
            mode = mode_from_str(selected);
        }
        let normalized = normalize_entry(email.as_str(), mode, spec_options.as_ref())?;
        rows.push(make_row(normalized, &cli));
    } else {
        args::Cli::clap_command().print_help()?;
        println!();
        return Ok(());
    }

    write_reports(&rows, &cli)?;

    if cli.spec_json {
        write_spec_json(&rows)?;
    }

    if any_invalid(&rows) {
        std::process::exit(2);
    }

    Ok(())
}

fn collect_from_stdin(
    cli: &Cli,
    mode: ValidationMode,
    rows: &mut Vec<OutputRow>,
    spec_options: Option<&SpecOptions>,
) -> Result<()> {
    for line in io::stdin().lock().lines() {
        let email = line.context("read stdin")?;
        let normalized = normalize_entry(email.as_str(), mode, spec_options)?;
        rows.push(make_row(normalized, cli));
    }
    Ok(())
}

fn normalize_entry(
    email: &str,
    mode: ValidationMode,
    spec_options: Option<&SpecOptions>,
) -> Result<mailprobe_lib::NormalizedEmail> {
    match spec_options {
        Some(opts) => Ok(normalize_email_with_spec(email, mode, Some(opts.clone()))?),
        None => Ok(normalize_email(email, mode)?),
    }
}
