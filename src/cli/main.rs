//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Filterctl.
//
// Filterctl is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Filterctl is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with Filterctl. If not, see <http://www.gnu.org/licenses/>.

use std::env;
use std::path::PathBuf;

use log::LevelFilter;
use structopt::StructOpt;

use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

/// Mail-driven control of per-user spam class and address book filters.
///
/// Without a subcommand, a message is read from standard input, checked to
/// come from an authenticated local user, and the command in its Subject
/// line is run. The output is mailed back to the sender.
///
/// Every option may also be set in the configuration file or through a
/// FILTERCTL_<OPTION> environment variable.
#[derive(StructOpt, Debug)]
#[structopt(name = "filterctl", max_term_width = 80)]
pub(super) struct Options {
    /// Read configuration from this file
    /// [default: ~/.filterctl.toml, /etc/filterctl/filterctl.toml, or
    /// /usr/local/etc/filterctl/filterctl.toml]
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,
    /// Log to this file, or to 'stderr' or 'syslog'.
    #[structopt(short, long)]
    log_file: Option<String>,
    /// Stop before running the requested command.
    #[structopt(short = "d", long)]
    disable_exec: bool,
    /// Write the reply to standard output instead of mailing it.
    #[structopt(short = "D", long)]
    disable_response: bool,
    /// Do not require the sender to be a local account.
    #[structopt(long)]
    insecure_disable_username_check: bool,
    /// Log debugging detail and include it in failure replies.
    #[structopt(short, long)]
    verbose: bool,
    /// Client certificate file.
    #[structopt(long)]
    cert: Option<String>,
    /// Client certificate key file.
    #[structopt(long)]
    key: Option<String>,
    /// Certificate authority file.
    #[structopt(long)]
    ca: Option<String>,
    /// Base URL of the filter configuration service.
    #[structopt(long)]
    server_url: Option<String>,
    /// The sender a command acts for.
    #[structopt(long)]
    sender: Option<String>,
    /// The encoded request ID stamped into command output.
    #[structopt(long)]
    message_id: Option<String>,
    /// Keep payload files after reading them.
    #[structopt(long)]
    no_remove: bool,

    #[structopt(subcommand)]
    command: Option<Command>,
}

impl Options {
    /// Override `config` with whatever was given on the command line.
    fn apply(&self, config: &mut SystemConfig) {
        fn set(slot: &mut String, value: &Option<String>) {
            if let Some(ref value) = *value {
                *slot = value.clone();
            }
        }

        set(&mut config.log_file, &self.log_file);
        set(&mut config.cert, &self.cert);
        set(&mut config.key, &self.key);
        set(&mut config.ca, &self.ca);
        set(&mut config.server_url, &self.server_url);
        set(&mut config.sender, &self.sender);
        set(&mut config.message_id, &self.message_id);

        config.disable_exec |= self.disable_exec;
        config.disable_response |= self.disable_response;
        config.insecure_disable_username_check |=
            self.insecure_disable_username_check;
        config.verbose |= self.verbose;
        config.no_remove |= self.no_remove;
    }
}

/// Commands run on behalf of the configured sender.
///
/// These are what the Subject line of a control message names. Each prints
/// a JSON object on standard output.
#[derive(StructOpt, Debug, Clone, PartialEq)]
pub(super) enum Command {
    /// Read a control message from standard input and act on it.
    ///
    /// This is the default when no command is given.
    Parse,
    /// Describe the available commands.
    Usage,
    /// Show the program version and the user it runs as.
    Version,
    /// List the sender's spam classes and their thresholds.
    Classes,
    /// Add or update a single class, given as CLASS=THRESHOLD.
    Set { spec: String },
    /// Delete the named classes, or all of them if none is named.
    Delete { classes: Vec<String> },
    /// Replace the class table with the given CLASS=THRESHOLD list, or with
    /// the defaults if none is given.
    Reset { specs: Vec<String> },
    /// Look up the class a spam score falls into.
    #[structopt(setting = clap::AppSettings::AllowNegativeNumbers)]
    Classify { score: String },
    /// List the sender's address books.
    Books,
    /// List the addresses in an address book.
    Addrs { book: String },
    /// Create an address book.
    Mkbook {
        book: String,
        description: Vec<String>,
    },
    /// Delete an address book and every address in it.
    Rmbook { book: String },
    /// Add an address to an address book, creating the book if needed.
    Mkaddr { book: String, address: String },
    /// Remove an address from an address book.
    Rmaddr { book: String, address: String },
    /// List the address books containing an address.
    Scan { address: String },
    /// Show the sender's address book password.
    Passwd,
    /// Dump the sender's classes, books, and addresses.
    Dump,
    /// Restore the sender's address books from a dump in FILE.
    Restore {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    /// Show address book credentials for each user in the JSON list in
    /// FILE.
    Accounts {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    /// Rescan the messages selected by the JSON object in FILE.
    Rescan {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    /// Show the status of one or all rescan jobs.
    Rescanstatus { id: Option<String> },
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options = Options::from_clap(&match Options::clap().get_matches_safe()
    {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        },
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        },
    });

    let config = match load_config(&options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            EX_CONFIG.exit()
        },
    };

    init_logging(&config);

    match options.command {
        None | Some(Command::Parse) => super::parse::main(&config),
        Some(Command::Usage) => super::local::usage(&config),
        Some(Command::Version) => super::local::version(&config),
        Some(command) => super::remote::main(&config, command),
    }
}

/// Build the effective configuration: file, then environment, then the
/// command line.
fn load_config(
    options: &Options,
) -> Result<SystemConfig, crate::support::error::Error> {
    let (mut config, _) = SystemConfig::load(options.config.as_deref())?;
    config.apply_env(env::vars())?;
    options.apply(&mut config);
    Ok(config)
}

fn init_logging(config: &SystemConfig) {
    let level = if config.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    match &*config.log_file {
        "stderr" | "-" => crate::init_simple_log(level),
        // Running interactively; ignore the log destination and just write
        // to stderr.
        _ if Ok(true) == nix::unistd::isatty(2) => {
            crate::init_simple_log(level)
        },
        "syslog" => {
            let formatter = syslog::Formatter3164 {
                facility: syslog::Facility::LOG_MAIL,
                hostname: None,
                process: env!("CARGO_PKG_NAME").to_owned(),
                pid: nix::unistd::getpid().as_raw(),
            };
            match syslog::unix(formatter) {
                Ok(logger) => {
                    if log::set_boxed_logger(Box::new(
                        syslog::BasicLogger::new(logger),
                    ))
                    .is_ok()
                    {
                        log::set_max_level(level);
                    }
                },
                Err(e) => {
                    eprintln!("Failed to connect to syslog: {}", e);
                    crate::init_simple_log(level);
                },
            }
        },
        path => {
            if let Err(e) = init_file_log(path, level) {
                eprintln!("Failed to open log file '{}': {}", path, e);
                crate::init_simple_log(level);
            }
        },
    }
}

fn init_file_log(
    path: &str,
    level: LevelFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    use log4rs::append::file::FileAppender;
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            &crate::support::log_pattern(),
        )))
        .build(path)?;
    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(appender)))
        .build(Root::builder().appender("file").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> Options {
        Options::from_iter_safe(args).unwrap()
    }

    #[test]
    fn no_subcommand_means_parse() {
        assert_eq!(None, parse(&["filterctl"]).command);
        assert_eq!(
            Some(Command::Parse),
            parse(&["filterctl", "parse"]).command
        );
    }

    #[test]
    fn subcommand_arguments() {
        assert_eq!(
            Some(Command::Classify {
                score: "-2.5".to_owned()
            }),
            parse(&["filterctl", "classify", "-2.5"]).command
        );
        assert_eq!(
            Some(Command::Mkbook {
                book: "friends".to_owned(),
                description: vec!["my".to_owned(), "friends".to_owned()],
            }),
            parse(&["filterctl", "mkbook", "friends", "my", "friends"])
                .command
        );
        assert_eq!(
            Some(Command::Rescanstatus { id: None }),
            parse(&["filterctl", "rescanstatus"]).command
        );
    }

    #[test]
    fn options_are_not_accepted_after_the_command() {
        assert!(Options::from_iter_safe(&[
            "filterctl",
            "passwd",
            "--sender",
            "root@example.com"
        ])
        .is_err());
    }

    #[test]
    fn command_line_overrides_config() {
        let options = parse(&[
            "filterctl",
            "-D",
            "--server-url",
            "http://10.0.0.1:2016",
            "--sender",
            "jdoe@example.com",
            "classes",
        ]);
        let mut config = SystemConfig::default();
        config.server_url = "http://localhost:1".to_owned();
        options.apply(&mut config);

        assert!(config.disable_response);
        assert!(!config.disable_exec);
        assert_eq!("http://10.0.0.1:2016", config.server_url);
        assert_eq!("jdoe@example.com", config.sender);
        assert_eq!("sendmail", config.sendmail);
    }
}
