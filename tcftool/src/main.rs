use clap::{Parser, Subcommand, ValueEnum};
use colored_json::{Color, ColorMode, Output, Styler, ToColoredJson};
use log::debug;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;
use tcf_consent::api::TcfApi;
use tcf_consent::storage::{GdprApplies, JsonFileStore};
use tcf_consent::tcf::{ConsentStringV1, ConsentStringV2, TcString};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a TCF consent string and display it in the console
    Decode {
        /// Consent string to decode, of any TCF version
        tc_string: String,
    },
    /// Encode a JSON consent model read from a file, or from standard input
    Encode {
        /// JSON file, as printed by the decode command. Use "-" or omit to read standard input
        file: Option<PathBuf>,
    },
    /// Manage consent stored in a JSON file
    Store {
        /// Path of the JSON store
        #[arg(short, long, env = "TCF_STORE", default_value = "tcf_store.json")]
        store: PathBuf,
        #[command(subcommand)]
        cmd: StoreCommands,
    },
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Decode a consent string and save it
    Save {
        /// Consent string to store, of any TCF version
        tc_string: String,
    },
    /// Display stored consent
    Show {
        /// Display raw stored values instead of decoded consent
        #[arg(short, long)]
        raw: bool,
    },
    /// Remove every stored value
    Clear,
    /// Set whether GDPR applies
    Gdpr {
        #[arg(value_enum)]
        applies: GdprArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GdprArg {
    Yes,
    No,
    Unset,
}

impl From<GdprArg> for GdprApplies {
    fn from(arg: GdprArg) -> Self {
        match arg {
            GdprArg::Yes => GdprApplies::Yes,
            GdprArg::No => GdprApplies::No,
            GdprArg::Unset => GdprApplies::Unset,
        }
    }
}

#[derive(Serialize)]
struct StoredConsent {
    gdpr_applies: GdprApplies,
    v1: Option<ConsentStringV1>,
    v2: Option<ConsentStringV2>,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    env_logger::init();
    let args = Cli::parse();

    let e = match args.cmd {
        Commands::Decode { tc_string } => decode(&tc_string),
        Commands::Encode { file } => encode(file),
        Commands::Store { store, cmd } => run_store_command(store, cmd),
    };

    if let Err(e) = e {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn decode(s: &str) -> CliResult {
    let tc_string = TcString::from_str(s)?;
    print_json(&tc_string)
}

fn encode(file: Option<PathBuf>) -> CliResult {
    let mut json = String::new();
    match file {
        Some(path) if path.as_os_str() != "-" => {
            File::open(&path)?.read_to_string(&mut json)?;
        }
        _ => {
            io::stdin().read_to_string(&mut json)?;
        }
    }

    let tc_string: TcString = serde_json::from_str(&json)?;
    println!("{}", tc_string.encode()?);
    Ok(())
}

fn run_store_command(path: PathBuf, cmd: StoreCommands) -> CliResult {
    debug!("using store {}", path.display());
    let api = TcfApi::new(JsonFileStore::new(path));

    match cmd {
        StoreCommands::Save { tc_string } => {
            let tc_string = api.set_consent_string(&tc_string)?;
            println!("stored TCF v{} consent string", tc_string.version());
        }
        StoreCommands::Show { raw: true } => print_json(&api.store().values()?)?,
        StoreCommands::Show { raw: false } => print_json(&StoredConsent {
            gdpr_applies: api.gdpr_applies()?,
            v1: api.consent_v1()?,
            v2: api.consent_v2()?,
        })?,
        StoreCommands::Clear => api.clear()?,
        StoreCommands::Gdpr { applies } => api.set_gdpr_applies(applies.into())?,
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!(
        "{}",
        serde_json::to_string_pretty(value)?
            .to_colored_json_with_styler(ColorMode::Auto(Output::StdOut), json_color_styler())?
    );
    Ok(())
}

fn json_color_styler() -> Styler {
    Styler {
        key: Color::Green.foreground(),
        string_value: Color::Blue.bold(),
        integer_value: Color::Magenta.bold(),
        float_value: Color::Magenta.italic(),
        object_brackets: Color::Yellow.bold(),
        array_brackets: Color::Cyan.bold(),
        ..Default::default()
    }
}
