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

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use super::error::Error;

/// Prefix of the environment variables which override configuration keys.
///
/// The same variables carry the configuration snapshot from the parent to
/// the re-executed child.
pub const ENV_PREFIX: &str = "FILTERCTL_";

/// Locations searched for the configuration file when none is given
/// explicitly. `~` is the invoking user's home directory.
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "~/.filterctl.toml",
    "/etc/filterctl/filterctl.toml",
    "/usr/local/etc/filterctl/filterctl.toml",
];

/// The configuration for Filterctl.
///
/// This is normally stored in `filterctl.toml`. Every key may also be set
/// through a `FILTERCTL_<KEY>` environment variable.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    /// The canonical name of the mail relay, as it appears in the `by`
    /// clause of the `Received` header.
    ///
    /// If empty, the system host name is used.
    pub hostname: String,
    /// Accepted domains, in order. The first is the domain of the reply
    /// sender.
    ///
    /// If empty, the domain part of the host name is used.
    pub domains: Vec<String>,

    /// Where to write the log: `stderr`, `-`, `syslog`, or a file path.
    pub log_file: String,
    /// Log at debug level and attach detail to failure replies.
    pub verbose: bool,

    /// Stop before running the requested command.
    pub disable_exec: bool,
    /// Write the reply to standard output instead of mailing it.
    pub disable_response: bool,
    /// Accept a `From` local part that does not name a local account.
    ///
    /// The relay and domain checks are still enforced.
    pub insecure_disable_username_check: bool,
    /// The mail submission command used to send the reply.
    pub sendmail: String,

    /// Base URL of the filter configuration service.
    pub server_url: String,
    /// Base URL of the rescan service.
    pub rescand_url: String,
    /// Client certificate presented to the services, PEM.
    pub cert: String,
    /// Private key for `cert`, PEM.
    pub key: String,
    /// Certificate authority for the services, PEM.
    pub ca: String,
    /// Sent as `X-Api-Key` on every service request.
    pub api_key: String,

    /// The verified sender the command acts for.
    pub sender: String,
    /// The base64-encoded request ID of the triggering message.
    pub message_id: String,
    /// Keep payload files after a command has read them.
    pub no_remove: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            hostname: String::new(),
            domains: vec![],
            log_file: "/var/log/filterctl".to_owned(),
            verbose: false,
            disable_exec: false,
            disable_response: false,
            insecure_disable_username_check: false,
            sendmail: "sendmail".to_owned(),
            server_url: "http://localhost:2016".to_owned(),
            rescand_url: "https://127.0.0.1:2017".to_owned(),
            cert: "~/ssl/filterctl.pem".to_owned(),
            key: "~/ssl/filterctl.key".to_owned(),
            ca: "/etc/ssl/keymaster.pem".to_owned(),
            api_key: String::new(),
            sender: String::new(),
            message_id: encode_request_id("filter_control_message"),
            no_remove: false,
        }
    }
}

impl SystemConfig {
    /// Parse a TOML configuration document.
    pub fn from_toml(data: &[u8]) -> Result<Self, Error> {
        toml::from_slice(data).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load the configuration file.
    ///
    /// If `explicit` is given, that file must exist. Otherwise the default
    /// locations are searched and the built-in defaults are used if none
    /// exists. Returns the path actually loaded, if any.
    pub fn load(
        explicit: Option<&Path>,
    ) -> Result<(Self, Option<PathBuf>), Error> {
        let path = match explicit {
            Some(path) => Some(path.to_owned()),
            None => DEFAULT_CONFIG_PATHS
                .iter()
                .map(|p| expand_home(p))
                .find(|p| p.is_file()),
        };

        let path = match path {
            Some(path) => path,
            None => return Ok((SystemConfig::default(), None)),
        };

        let data = fs::read(&path).map_err(|e| {
            Error::Config(format!("Error reading '{}': {}", path.display(), e))
        })?;
        let config = SystemConfig::from_toml(&data).map_err(|e| {
            Error::Config(format!("In '{}': {}", path.display(), e))
        })?;
        Ok((config, Some(path)))
    }

    /// Override keys from `FILTERCTL_<KEY>` variables.
    ///
    /// Lists are comma-separated and booleans are `true` or `false`.
    /// Variables that do not name a key are ignored.
    pub fn apply_env(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), Error> {
        let mut table = match self.to_table()? {
            toml::Value::Table(table) => table,
            _ => unreachable!(),
        };

        for (name, raw) in vars {
            let key = match name.strip_prefix(ENV_PREFIX) {
                Some(key) => key.to_ascii_lowercase(),
                None => continue,
            };

            let slot = match table.get_mut(&key) {
                Some(slot) => slot,
                None => {
                    debug!("Ignoring unknown setting {}", name);
                    continue;
                },
            };

            *slot = match *slot {
                toml::Value::Boolean(_) => {
                    toml::Value::Boolean(raw.trim().parse().map_err(|_| {
                        Error::Config(format!(
                            "{} must be true or false, got '{}'",
                            name, raw
                        ))
                    })?)
                },
                toml::Value::Array(_) => toml::Value::Array(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| toml::Value::String(s.to_owned()))
                        .collect(),
                ),
                _ => toml::Value::String(raw),
            };
        }

        *self = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| Error::Config(e.to_string()))?;
        Ok(())
    }

    /// Render every key as a `FILTERCTL_<KEY>` variable, in the format
    /// understood by `apply_env`.
    pub fn to_env(&self) -> Result<Vec<(String, String)>, Error> {
        let table = match self.to_table()? {
            toml::Value::Table(table) => table,
            _ => unreachable!(),
        };

        Ok(table
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Array(items) => items
                        .iter()
                        .filter_map(toml::Value::as_str)
                        .collect::<Vec<_>>()
                        .join(","),
                    other => other.to_string(),
                };
                (format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase()), value)
            })
            .collect())
    }

    /// Decode `message_id` back into the request ID.
    pub fn request_id(&self) -> Result<String, Error> {
        decode_request_id(&self.message_id)
    }

    fn to_table(&self) -> Result<toml::Value, Error> {
        toml::Value::try_from(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Encode a request ID for transport in `message_id`.
///
/// Message IDs may contain characters that do not survive a round trip
/// through the environment or the command line unscathed.
pub fn encode_request_id(request_id: &str) -> String {
    base64::encode(request_id)
}

pub fn decode_request_id(encoded: &str) -> Result<String, Error> {
    if encoded.is_empty() {
        return Err(Error::Config("message_id is empty".to_owned()));
    }

    base64::decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| {
            Error::Config(format!("message_id is not valid: {}", encoded))
        })
}

/// Expand a leading `~` to the home directory of the invoking user.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => {
            let home = std::env::var_os("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest.trim_start_matches('/'))
        },
        None => PathBuf::from(path),
    }
}

/// Read a file named by a path-valued configuration key.
pub fn read_config_file(key: &str, path: &str) -> Result<Vec<u8>, Error> {
    if path.len() < 2 {
        return Err(Error::Config(format!("{} is too short: '{}'", key, path)));
    }

    let path = expand_home(path);
    fs::read(&path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::Config(format!(
            "{} file '{}' does not exist",
            key,
            path.display()
        )),
        _ => Error::Io(e),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_partial_config() {
        let config = SystemConfig::from_toml(
            br#"
hostname = "mail.example.com"
domains = ["example.com", "example.org"]
disable_response = true
"#,
        )
        .unwrap();

        assert_eq!("mail.example.com", config.hostname);
        assert_eq!(vec!["example.com", "example.org"], config.domains);
        assert!(config.disable_response);
        assert!(!config.disable_exec);
        assert_eq!("sendmail", config.sendmail);
        assert_eq!("http://localhost:2016", config.server_url);
    }

    #[test]
    fn unknown_types_are_config_errors() {
        assert_matches!(
            Err(Error::Config(..)),
            SystemConfig::from_toml(b"verbose = \"very\"")
        );
    }

    #[test]
    fn env_overrides_keys() {
        let mut config = SystemConfig::default();
        config
            .apply_env(vec![
                ("FILTERCTL_HOSTNAME".to_owned(), "mx.example.net".to_owned()),
                (
                    "FILTERCTL_DOMAINS".to_owned(),
                    "example.net, example.com,".to_owned(),
                ),
                ("FILTERCTL_VERBOSE".to_owned(), "true".to_owned()),
                ("FILTERCTL_NO_SUCH_KEY".to_owned(), "x".to_owned()),
                ("HOSTNAME".to_owned(), "ignored".to_owned()),
            ])
            .unwrap();

        assert_eq!("mx.example.net", config.hostname);
        assert_eq!(vec!["example.net", "example.com"], config.domains);
        assert!(config.verbose);
    }

    #[test]
    fn env_rejects_bad_booleans() {
        let mut config = SystemConfig::default();
        assert_matches!(
            Err(Error::Config(..)),
            config.apply_env(vec![(
                "FILTERCTL_DISABLE_EXEC".to_owned(),
                "yes".to_owned()
            )])
        );
    }

    #[test]
    fn env_snapshot_survives_reload() {
        let mut original = SystemConfig::default();
        original.hostname = "mail.example.com".to_owned();
        original.domains =
            vec!["example.com".to_owned(), "example.org".to_owned()];
        original.disable_response = true;
        original.sender = "alice@example.com".to_owned();
        original.message_id = encode_request_id("abc@mail.example.com");

        let env = original.to_env().unwrap();
        assert!(env.contains(&(
            "FILTERCTL_DOMAINS".to_owned(),
            "example.com,example.org".to_owned()
        )));
        assert!(env.contains(&(
            "FILTERCTL_DISABLE_RESPONSE".to_owned(),
            "true".to_owned()
        )));

        let mut reloaded = SystemConfig::default();
        reloaded.apply_env(env).unwrap();
        assert_eq!(original.hostname, reloaded.hostname);
        assert_eq!(original.domains, reloaded.domains);
        assert_eq!(original.sender, reloaded.sender);
        assert!(reloaded.disable_response);
        assert_eq!("abc@mail.example.com", reloaded.request_id().unwrap());
    }

    #[test]
    fn request_id_decoding() {
        assert_eq!(
            "filter_control_message",
            SystemConfig::default().request_id().unwrap()
        );
        assert_matches!(Err(Error::Config(..)), decode_request_id(""));
        assert_matches!(Err(Error::Config(..)), decode_request_id("!!!"));
    }

    #[test]
    fn home_expansion() {
        let home = PathBuf::from(std::env::var_os("HOME").unwrap_or_default());
        assert_eq!(home.join("ssl/x.pem"), expand_home("~/ssl/x.pem"));
        assert_eq!(PathBuf::from("/etc/x"), expand_home("/etc/x"));
    }
}
