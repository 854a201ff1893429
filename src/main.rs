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

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

/// Log an error and exit the process with the given `Sysexit`.
macro_rules! die {
    ($sysexit:expr, $($stuff:tt)*) => {{
        log::error!($($stuff)*);
        $sysexit.exit()
    }}
}

mod cli;
mod gateway;
mod mime;
mod support;

#[cfg(test)]
mod test_data;

fn main() {
    cli::main::main();
}

/// Initialise logging to standard error only.
///
/// Used when running interactively and when the configured log destination
/// is `stderr`.
fn init_simple_log(level: log::LevelFilter) {
    use log4rs::append::console::{ConsoleAppender, Target};
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let appender = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(&support::log_pattern())))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(appender)))
        .build(Root::builder().appender("stderr").build(level));

    match config {
        Ok(config) => {
            // Only fails if a logger is already installed, which is harmless
            let _ = log4rs::init_config(config);
        },
        Err(e) => eprintln!("Failed to configure logging: {}", e),
    }
}
