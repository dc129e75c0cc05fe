use jar_string_replacer::replace::{self, LogObserver, Policy, Rules, Settings};
use jar_string_replacer::Error;

use clap::{crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process;

const REPLACEMENTS_HELP: &str = "Replacements:
  %int%           A random integer, drawn again for every occurrence
  %<value>|orig%  Either <value> or the original placeholder (see --probability)
  anything else   Used as is";

fn cli() -> Command {
    Command::new("jar-string-replacer")
        .version(crate_version!())
        .about("Replace placeholder strings loaded by the classes of a JAR")
        .after_help(REPLACEMENTS_HELP)
        .arg(
            Arg::new("class")
                .short('c')
                .long("class")
                .value_name("NAME")
                .help("Only replace strings in classes whose name contains NAME"),
        )
        .arg(
            Arg::new("spigot50")
                .long("spigot50")
                .action(ArgAction::SetTrue)
                .conflicts_with("spigot100")
                .help("Replace half of all SpigotMC placeholders with 1111/2222/3333"),
        )
        .arg(
            Arg::new("spigot100")
                .long("spigot100")
                .action(ArgAction::SetTrue)
                .help("Replace all SpigotMC placeholders with 1111/2222/3333"),
        )
        .arg(
            Arg::new("probability")
                .short('p')
                .long("probability")
                .value_name("P")
                .value_parser(value_parser!(f64))
                .default_value("0.5")
                .help("Probability with which `%<value>|orig%` picks <value>"),
        )
        .arg(
            Arg::new("library")
                .short('l')
                .long("library")
                .value_name("JAR")
                .value_parser(value_parser!(PathBuf))
                .action(ArgAction::Append)
                .help("Extra archive to look up classes in (may be repeated)"),
        )
        .arg(
            Arg::new("threads")
                .short('j')
                .long("threads")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Number of worker threads [default: available parallelism]"),
        )
        .arg(
            Arg::new("INPUT")
                .help("JAR to read")
                .value_parser(value_parser!(PathBuf))
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("OUTPUT")
                .help("JAR to write")
                .value_parser(value_parser!(PathBuf))
                .required(true)
                .index(2),
        )
        .arg(
            Arg::new("pairs")
                .value_name("PLACEHOLDER REPLACEMENT")
                .help("Placeholders and what to replace them with")
                .num_args(1..)
                .allow_hyphen_values(true)
                .index(3),
        )
}

fn settings(matches: &ArgMatches) -> Result<Settings, Error> {
    let probability = matches
        .get_one::<f64>("probability")
        .copied()
        .unwrap_or(Policy::DEFAULT_PROBABILITY);
    let probability = replace::check_probability(probability)?;

    let mut rules = Rules::new();
    if matches.get_flag("spigot50") {
        rules.insert_spigot_placeholders(0.5)?;
    } else if matches.get_flag("spigot100") {
        rules.insert_spigot_placeholders(1.0)?;
    }

    let mut settings = Settings::new(rules);
    let pairs: Vec<&String> = matches
        .get_many::<String>("pairs")
        .map(Iterator::collect)
        .unwrap_or_default();
    settings.insert_pairs(&pairs, probability)?;

    settings.class_filter = matches.get_one::<String>("class").cloned();
    if let Some(libraries) = matches.get_many::<PathBuf>("library") {
        settings.libraries = libraries.cloned().collect();
    }
    if let Some(threads) = matches.get_one::<usize>("threads") {
        settings.threads = NonZeroUsize::new(*threads).ok_or_else(|| {
            Error::Configuration(String::from("number of threads must be at least 1"))
        })?;
    }
    settings.validate()?;
    Ok(settings)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut command = cli();
    let matches = command.get_matches_mut();

    let result = settings(&matches).and_then(|settings| {
        let input = matches.get_one::<PathBuf>("INPUT");
        let output = matches.get_one::<PathBuf>("OUTPUT");
        match (input, output) {
            (Some(input), Some(output)) => {
                log::info!("Rewriting '{}' into '{}'", input.display(), output.display());
                replace::replace_jar(input, output, &settings, &LogObserver)
            }
            _ => Err(Error::Configuration(String::from(
                "expected an input and an output JAR",
            ))),
        }
    });

    match result {
        Ok(_) => (),
        Err(Error::Configuration(msg)) => {
            eprintln!("error: {}\n\n{}", msg, command.render_usage());
            process::exit(2);
        }
        Err(err) => {
            log::error!("{}", err);
            process::exit(1);
        }
    }
}
