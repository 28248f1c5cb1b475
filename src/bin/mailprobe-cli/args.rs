use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use mailprobe_lib::{SpecOptions, ValidationMode};

#[derive(Parser)]
#[command(name = "mailprobe-cli")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /// lit des adresses depuis stdin (une par ligne)
    #[arg(long)]
    pub stdin: bool,

    /// write report to file (JSON/NDJSON/CSV selon --format)
    #[arg(long)]
    pub out: Option<String>,

    /// mode: strict|relaxed
    #[arg(long, default_value = "strict")]
    pub mode: String,

    /// format: human|json|ndjson|csv
    #[arg(long, default_value = "human")]
    pub format: String,

    /// active la détection de caractères spéciaux/typosquatting
    #[arg(long)]
    pub spec_chars: bool,

    /// profil: standard|strict|fr-fraud
    #[arg(long, default_value = "standard")]
    pub spec_profile: String,

    /// dump SpecCharacters (JSON par ligne)
    #[arg(long)]
    pub spec_json: bool,

    /// force la génération du hint ASCII
    #[arg(long)]
    pub ascii_hint: bool,

    /// résout les enregistrements MX du domaine (feature `with-mx`)
    #[cfg(feature = "with-mx")]
    #[arg(long)]
    pub mx: bool,

    /// sonde la délivrabilité SMTP par `RCPT TO` (features `with-mx` + `with-smtp-probe`)
    #[cfg(all(feature = "with-mx", feature = "with-smtp-probe"))]
    #[arg(long)]
    pub deliverability: bool,

}

#[derive(Subcommand)]
pub enum Commands {
    Validate {
        /// mode: strict|relaxed (prend le pas sur l'option globale)
        #[arg(long)]
        mode: Option<String>,
        email: String,
    },
    #[cfg(feature = "with-smtp-probe")]
    #[command(name = "verify-exists")]
    VerifyExists {
        /// adresse e-mail à tester
        email: String,
        /// format de sortie (human|json)
        #[arg(long, default_value = "human")]
        format: String,
        /// enveloppe MAIL FROM et nom EHLO (par défaut user@localhost)
        #[arg(long = "from")]
        mail_from: Option<String>,
        /// hôte(s) MX à interroger, par ordre de priorité (répétable); à
        /// défaut, résolus via la feature `with-mx`
        #[arg(long = "mx-host")]
        mx_hosts: Vec<String>,
        /// port SMTP cible
        #[arg(long, default_value_t = 25)]
        port: u16,
        /// désactive la sonde anti catch-all
        #[arg(long = "no-catchall-probe")]
        no_catchall_probe: bool,
        /// considère un domaine catch-all comme une adresse valide
        #[arg(long = "catchall-is-valid")]
        catchall_is_valid: bool,
        /// considère un 45x (greylisting) comme une adresse valide
        #[arg(long = "greylist-is-valid")]
        greylist_is_valid: bool,
        /// considère un échec de communication comme une adresse valide
        #[arg(long = "no-comm-is-valid")]
        no_comm_is_valid: bool,
        /// considère un échec de connexion comme une adresse valide
        #[arg(long = "no-conn-is-valid")]
        no_conn_is_valid: bool,
        /// timeout appliqué à chaque commande (ms)
        #[arg(long = "timeout", default_value_t = 10_000)]
        timeout_ms: u64,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn clap_command() -> clap::Command {
        <Self as clap::CommandFactory>::command()
    }

    pub fn parsed_mode(&self) -> ValidationMode {
        mode_from_str(&self.mode)
    }

    pub fn spec_requested(&self) -> bool {
        self.spec_chars || self.spec_json || self.ascii_hint
    }
}

pub fn mode_from_str(s: &str) -> ValidationMode {
    match s {
        "relaxed" => ValidationMode::Relaxed,
        _ => ValidationMode::Strict,
    }
}

pub fn spec_options_from_profile(profile: &str) -> Result<SpecOptions> {
    match profile {
        "standard" => Ok(SpecOptions::standard()),
        "strict" => Ok(SpecOptions::strict()),
        "fr-fraud" => Ok(SpecOptions::fr_fraud()),
        other => bail!("unknown --spec-profile '{other}'"),
    }
}
