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

//! Commands answered by the filter configuration and rescan services.

use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde_json::{json, Map, Value};

use super::main::Command;
use crate::support::api_client::{
    message_of, stamp, ApiClient, ApiRequest, Service,
};
use crate::support::error::Error;
use crate::support::safe_name::is_safe_segment;
use crate::support::system_config::SystemConfig;

lazy_static! {
    static ref CLASS_SPEC: Regex = Regex::new(
        r"^\s*([a-zA-Z][a-zA-Z0-9_-]*)=([-0-9.][0-9.]*)\s*$"
    ).unwrap();
}

/// Response messages of `mkaddr` that are fixed by creating something and
/// trying again.
const UNKNOWN_USER: &str = "AddAddress failed: Unknown user:";
const NO_SUCH_BOOK: &str = "QueryAddressBook failed: 404 Not Found";

/// Enough for creating the user, then the book, then the address.
const MKADDR_ATTEMPTS: usize = 3;

pub(super) fn main(config: &SystemConfig, command: Command) {
    super::local::finish(execute(config, command, |url| {
        ApiClient::new(config, url)
    }));
}

/// Run `command` for the configured sender against the services reached
/// through `connect`, which is given the base URL of the service.
fn execute<S: Service>(
    config: &SystemConfig,
    command: Command,
    connect: impl Fn(&str) -> Result<S, Error>,
) -> Result<Value, Error> {
    let sender = &*config.sender;
    if !is_safe_segment(sender) {
        return Err(Error::Config(format!(
            "sender is missing or invalid: '{}'",
            sender
        )));
    }
    let request_id = config.request_id()?;
    let filter = || connect(&config.server_url);
    let rescan = || connect(&config.rescand_url);

    let mut response = match command {
        Command::Classes => filter()?
            .send(&ApiRequest::get(format!("/filterctl/classes/{}/", sender)))?,

        Command::Set { spec } => {
            let (class, threshold) = parse_class_spec(&spec)?;
            filter()?.send(&ApiRequest::put(format!(
                "/filterctl/classes/{}/{}/{}/",
                sender, class, threshold
            )))?
        },

        Command::Delete { classes } => {
            let filter = filter()?;
            if classes.is_empty() {
                filter.send(&ApiRequest::delete(format!(
                    "/filterctl/classes/{}",
                    sender
                )))?
            } else {
                let mut last = Value::Null;
                for class in &classes {
                    last = filter.send(&ApiRequest::delete(format!(
                        "/filterctl/classes/{}/{}",
                        sender,
                        segment(class)?
                    )))?;
                }
                last
            }
        },

        Command::Reset { specs } => {
            let mut classes = Vec::with_capacity(specs.len());
            for spec in &specs {
                let (name, threshold) = parse_class_spec(spec)?;
                let score: f64 = threshold.parse().map_err(|_| {
                    Error::Payload(format!(
                        "invalid threshold in class specifier '{}'",
                        spec
                    ))
                })?;
                classes.push(json!({ "name": name, "score": score }));
            }
            filter()?.send(&ApiRequest::post(
                "/filterctl/classes/",
                json!({ "Address": sender, "Classes": classes }),
            ))?
        },

        Command::Classify { score } => {
            if score.parse::<f64>().is_err() {
                return Err(Error::Payload(format!(
                    "invalid score '{}'",
                    score
                )));
            }
            filter()?.send(&ApiRequest::get(format!(
                "/filterctl/class/{}/{}/",
                sender, score
            )))?
        },

        Command::Books => filter()?
            .send(&ApiRequest::get(format!("/filterctl/books/{}/", sender)))?,

        Command::Addrs { book } => filter()?.send(&ApiRequest::get(format!(
            "/filterctl/addresses/{}/{}/",
            sender,
            segment(&book)?
        )))?,

        Command::Mkbook { book, description } => {
            let description = if description.is_empty() {
                book.clone()
            } else {
                description.join(" ")
            };
            filter()?.send(&add_book(sender, &book, &description))?
        },

        Command::Rmbook { book } => {
            filter()?.send(&ApiRequest::delete(format!(
                "/filterctl/book/{}/{}/",
                sender,
                segment(&book)?
            )))?
        },

        Command::Mkaddr { book, address } => {
            mkaddr(&filter()?, sender, &book, &address)?
        },

        Command::Rmaddr { book, address } => {
            filter()?.send(&ApiRequest::delete(format!(
                "/filterctl/address/{}/{}/{}/",
                sender,
                segment(&book)?,
                segment(&address)?
            )))?
        },

        Command::Scan { address } => filter()?.send(&ApiRequest::get(
            format!("/filterctl/scan/{}/{}/", sender, segment(&address)?),
        ))?,

        Command::Passwd => filter()?
            .send(&ApiRequest::get(format!("/filterctl/passwd/{}/", sender)))?,

        Command::Dump => {
            let filter = filter()?;
            let mut dump = filter.send(&ApiRequest::get(format!(
                "/filterctl/dump/{}/",
                sender
            )))?;
            let classes = filter.send(&ApiRequest::get(format!(
                "/filterctl/classes/{}/",
                sender
            )))?;
            let classes = match classes {
                Value::Object(mut map) => {
                    map.remove("Classes").unwrap_or(Value::Object(map))
                },
                other => other,
            };
            if let Value::Object(ref mut map) = dump {
                map.insert("Classes".to_owned(), classes);
            }
            dump
        },

        Command::Restore { file } => {
            let dump = read_payload(config, &file)?;
            filter()?.send(&ApiRequest::post(
                "/filterctl/restore/",
                json!({ "Username": sender, "Dump": dump }),
            ))?
        },

        Command::Accounts { file } => {
            let users: Vec<String> =
                serde_json::from_value(read_payload(config, &file)?).map_err(
                    |e| {
                        Error::Payload(format!(
                            "expected a list of addresses: {}",
                            e
                        ))
                    },
                )?;

            let filter = filter()?;
            let mut accounts = Map::new();
            for user in &users {
                let response = filter.send(&ApiRequest::get(format!(
                    "/filterctl/passwd/{}/",
                    segment(user)?
                )))?;
                let password =
                    response.get("Password").cloned().unwrap_or(Value::Null);
                accounts.insert(user.clone(), password);
            }

            json!({
                "Success": true,
                "Message": "cardDAV user accounts",
                "Accounts": accounts,
            })
        },

        Command::Rescan { file } => {
            let mut selection = match read_payload(config, &file)? {
                Value::Object(map) => map,
                _ => {
                    return Err(Error::Payload(
                        "message selection must be a JSON object".to_owned(),
                    ))
                },
            };
            selection.insert("Username".to_owned(), json!(sender));
            rescan()?.send(&ApiRequest::post(
                "/rescan/",
                Value::Object(selection),
            ))?
        },

        Command::Rescanstatus { id } => {
            let path = match id {
                None => "/rescan/".to_owned(),
                Some(id) => format!("/rescan/{}/", segment(&id)?),
            };
            rescan()?.send(&ApiRequest::get(path))?
        },

        // Dispatched before getting here
        Command::Parse | Command::Usage | Command::Version => unreachable!(),
    };

    stamp(&mut response, sender, &request_id);
    Ok(response)
}

/// Split a `CLASS=THRESHOLD` specifier.
fn parse_class_spec(spec: &str) -> Result<(&str, &str), Error> {
    let captures = CLASS_SPEC.captures(spec).ok_or_else(|| {
        Error::Payload(format!("failed to parse class specifier '{}'", spec))
    })?;
    let (class, threshold) = match (captures.get(1), captures.get(2)) {
        (Some(class), Some(threshold)) => (class.as_str(), threshold.as_str()),
        _ => {
            return Err(Error::Payload(format!(
                "failed to parse class specifier '{}'",
                spec
            )))
        },
    };

    if threshold.parse::<f64>().is_err() {
        return Err(Error::Payload(format!(
            "invalid threshold value in class specifier '{}'",
            spec
        )));
    }
    Ok((class, threshold))
}

/// Check that `name` can be placed in a request path as-is.
fn segment(name: &str) -> Result<&str, Error> {
    if is_safe_segment(name) {
        Ok(name)
    } else {
        Err(Error::Payload(format!("invalid name '{}'", name)))
    }
}

fn add_book(sender: &str, book: &str, description: &str) -> ApiRequest {
    ApiRequest::post(
        "/filterctl/book/",
        json!({
            "Username": sender,
            "Bookname": book,
            "Description": description,
        }),
    )
}

/// Add `address` to `book`, creating the user and the book first if the
/// service does not know them yet.
fn mkaddr(
    filter: &impl Service,
    sender: &str,
    book: &str,
    address: &str,
) -> Result<Value, Error> {
    let request = ApiRequest::post(
        "/filterctl/address/",
        json!({
            "Username": sender,
            "Bookname": book,
            "Address": address,
            "Name": "",
        }),
    );

    for _ in 0..MKADDR_ATTEMPTS {
        // The service may report these with an error status
        let (response, message) = match filter.send(&request) {
            Ok(response) => {
                let message = message_of(&response).to_owned();
                (Some(response), message)
            },
            Err(Error::Api(message)) => (None, message),
            Err(e) => return Err(e),
        };

        if message.contains(UNKNOWN_USER) {
            info!("Creating user {}", sender);
            filter.send(&ApiRequest::post(
                "/filterctl/user/",
                json!({ "Username": sender, "Email": "", "Password": "" }),
            ))?;
        } else if message.contains(NO_SUCH_BOOK) {
            info!("Creating address book {} for {}", book, sender);
            filter.send(&add_book(sender, book, book))?;
        } else {
            return match response {
                Some(response) => Ok(response),
                None => Err(Error::Api(message)),
            };
        }
    }

    Err(Error::Api(format!(
        "mkaddr {} {} still failing after {} attempts",
        book, address, MKADDR_ATTEMPTS
    )))
}

/// Read and parse the JSON payload file of a command, then remove it unless
/// `no_remove` is set.
fn read_payload(config: &SystemConfig, path: &Path) -> Result<Value, Error> {
    let data = fs::read(path)?;
    if !config.no_remove {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove '{}': {}", path.display(), e);
        }
    }

    serde_json::from_slice(&data).map_err(|e| {
        Error::Payload(format!("'{}' is not valid JSON: {}", path.display(), e))
    })
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use reqwest::Method;

    use super::*;
    use crate::support::system_config::encode_request_id;

    /// Answers requests from a script and records them.
    #[derive(Default)]
    struct Fake {
        urls: RefCell<Vec<String>>,
        requests: RefCell<Vec<ApiRequest>>,
        responses: RefCell<VecDeque<Result<Value, Error>>>,
    }

    impl Fake {
        fn new(responses: Vec<Result<Value, Error>>) -> Self {
            Fake {
                responses: RefCell::new(responses.into()),
                ..Fake::default()
            }
        }

        fn run(
            &self,
            config: &SystemConfig,
            command: Command,
        ) -> Result<Value, Error> {
            execute(config, command, |url| {
                self.urls.borrow_mut().push(url.to_owned());
                Ok(self)
            })
        }

        fn paths(&self) -> Vec<(Method, String)> {
            self.requests
                .borrow()
                .iter()
                .map(|r| (r.method.clone(), r.path.clone()))
                .collect()
        }
    }

    impl Service for Fake {
        fn send(&self, request: &ApiRequest) -> Result<Value, Error> {
            self.requests.borrow_mut().push(request.clone());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({ "Success": true })))
        }
    }

    fn config() -> SystemConfig {
        let mut config = SystemConfig::default();
        config.sender = "jdoe@example.com".to_owned();
        config.message_id = encode_request_id("5f1c2d3e-0001@example.com");
        config
    }

    #[test]
    fn responses_are_stamped() {
        let fake = Fake::new(vec![Ok(json!({
            "Success": true,
            "Classes": [{ "name": "spam", "score": 999 }],
        }))]);
        let response = fake.run(&config(), Command::Classes).unwrap();

        assert_eq!(
            vec![(
                Method::GET,
                "/filterctl/classes/jdoe@example.com/".to_owned()
            )],
            fake.paths()
        );
        assert_eq!("jdoe@example.com", response["User"]);
        assert_eq!("5f1c2d3e-0001@example.com", response["Request"]);
        assert_eq!("spam", response["Classes"][0]["name"]);
        assert_eq!(vec![config().server_url], *fake.urls.borrow());
    }

    #[test]
    fn sender_is_required() {
        let mut config = config();
        config.sender = String::new();
        let fake = Fake::default();
        assert_matches!(
            Err(Error::Config(..)),
            fake.run(&config, Command::Passwd)
        );
        assert!(fake.paths().is_empty());
    }

    #[test]
    fn class_specifiers() {
        assert_eq!(("spam", "10.5"), parse_class_spec("spam=10.5").unwrap());
        assert_eq!(
            ("not-spam", "-2"),
            parse_class_spec(" not-spam=-2 ").unwrap()
        );
        assert_matches!(Err(Error::Payload(..)), parse_class_spec("spam"));
        assert_matches!(Err(Error::Payload(..)), parse_class_spec("9x=1"));
        assert_matches!(
            Err(Error::Payload(..)),
            parse_class_spec("spam=1.2.3")
        );
        assert_matches!(Err(Error::Payload(..)), parse_class_spec("spam=x"));

        let fake = Fake::default();
        fake.run(
            &config(),
            Command::Set {
                spec: "ham=0.5".to_owned(),
            },
        )
        .unwrap();
        assert_eq!(
            vec![(
                Method::PUT,
                "/filterctl/classes/jdoe@example.com/ham/0.5/".to_owned()
            )],
            fake.paths()
        );
    }

    #[test]
    fn reset_posts_class_table() {
        let fake = Fake::default();
        fake.run(
            &config(),
            Command::Reset {
                specs: vec!["ham=0".to_owned(), "spam=99.5".to_owned()],
            },
        )
        .unwrap();

        let requests = fake.requests.borrow();
        assert_eq!("/filterctl/classes/", requests[0].path);
        assert_eq!(
            Some(json!({
                "Address": "jdoe@example.com",
                "Classes": [
                    { "name": "ham", "score": 0.0 },
                    { "name": "spam", "score": 99.5 },
                ],
            })),
            requests[0].body
        );
    }

    #[test]
    fn delete_each_or_all() {
        let fake = Fake::default();
        fake.run(&config(), Command::Delete { classes: vec![] })
            .unwrap();
        fake.run(
            &config(),
            Command::Delete {
                classes: vec!["ham".to_owned(), "spam".to_owned()],
            },
        )
        .unwrap();
        assert_eq!(
            vec![
                (
                    Method::DELETE,
                    "/filterctl/classes/jdoe@example.com".to_owned()
                ),
                (
                    Method::DELETE,
                    "/filterctl/classes/jdoe@example.com/ham".to_owned()
                ),
                (
                    Method::DELETE,
                    "/filterctl/classes/jdoe@example.com/spam".to_owned()
                ),
            ],
            fake.paths()
        );
    }

    #[test]
    fn unsafe_names_never_reach_the_service() {
        let fake = Fake::default();
        assert_matches!(
            Err(Error::Payload(..)),
            fake.run(
                &config(),
                Command::Addrs {
                    book: "../passwd".to_owned()
                }
            )
        );
        assert_matches!(
            Err(Error::Payload(..)),
            fake.run(
                &config(),
                Command::Rmaddr {
                    book: "friends".to_owned(),
                    address: "a?b".to_owned(),
                }
            )
        );
        assert_matches!(
            Err(Error::Payload(..)),
            fake.run(
                &config(),
                Command::Classify {
                    score: "1/x".to_owned()
                }
            )
        );
        assert!(fake.paths().is_empty());
    }

    #[test]
    fn mkbook_defaults_description() {
        let fake = Fake::default();
        fake.run(
            &config(),
            Command::Mkbook {
                book: "friends".to_owned(),
                description: vec![],
            },
        )
        .unwrap();
        fake.run(
            &config(),
            Command::Mkbook {
                book: "work".to_owned(),
                description: vec!["office".to_owned(), "mail".to_owned()],
            },
        )
        .unwrap();

        let requests = fake.requests.borrow();
        let descriptions = requests
            .iter()
            .map(|r| r.body.as_ref().unwrap()["Description"].clone())
            .collect::<Vec<_>>();
        assert_eq!(vec!["friends", "office mail"], descriptions);
    }

    #[test]
    fn mkaddr_creates_user_and_book() {
        let fake = Fake::new(vec![
            Ok(json!({
                "Success": false,
                "Message": "AddAddress failed: Unknown user: jdoe@example.com",
            })),
            Ok(json!({ "Success": true })),
            Err(Error::Api(
                "POST /filterctl/address/ returned status 404 Not Found: \
                 QueryAddressBook failed: 404 Not Found"
                    .to_owned(),
            )),
            Ok(json!({ "Success": true })),
            Ok(json!({ "Success": true, "Message": "added" })),
        ]);
        let response = fake
            .run(
                &config(),
                Command::Mkaddr {
                    book: "friends".to_owned(),
                    address: "alice@example.org".to_owned(),
                },
            )
            .unwrap();

        assert_eq!("added", response["Message"]);
        let paths: Vec<String> =
            fake.paths().into_iter().map(|(_, p)| p).collect();
        assert_eq!(
            vec![
                "/filterctl/address/",
                "/filterctl/user/",
                "/filterctl/address/",
                "/filterctl/book/",
                "/filterctl/address/",
            ],
            paths
        );
        assert_eq!(
            "alice@example.org",
            fake.requests.borrow()[0].body.as_ref().unwrap()["Address"]
        );
    }

    #[test]
    fn mkaddr_gives_up() {
        let unknown = || {
            Ok(json!({
                "Success": false,
                "Message": "AddAddress failed: Unknown user: jdoe@example.com",
            }))
        };
        let fake = Fake::new(vec![
            unknown(),
            Ok(json!({})),
            unknown(),
            Ok(json!({})),
            unknown(),
            Ok(json!({})),
        ]);
        assert_matches!(
            Err(Error::Api(..)),
            fake.run(
                &config(),
                Command::Mkaddr {
                    book: "friends".to_owned(),
                    address: "alice@example.org".to_owned(),
                }
            )
        );
        assert_eq!(6, fake.paths().len());
    }

    #[test]
    fn dump_includes_classes() {
        let fake = Fake::new(vec![
            Ok(json!({ "Success": true, "Password": "pw", "Books": {} })),
            Ok(json!({ "Success": true, "Classes": [{ "name": "spam" }] })),
        ]);
        let response = fake.run(&config(), Command::Dump).unwrap();
        assert_eq!("pw", response["Password"]);
        assert_eq!("spam", response["Classes"][0]["name"]);
    }

    #[test]
    fn payload_files_are_consumed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("filterctl-1.json");
        fs::write(&file, r#"["alice@example.com", "bob@example.com"]"#)
            .unwrap();

        let fake = Fake::new(vec![
            Ok(json!({ "Password": "a" })),
            Ok(json!({ "Password": "b" })),
        ]);
        let response = fake
            .run(&config(), Command::Accounts { file: file.clone() })
            .unwrap();
        assert_eq!("a", response["Accounts"]["alice@example.com"]);
        assert_eq!("b", response["Accounts"]["bob@example.com"]);
        assert!(!file.exists());

        let mut config = config();
        config.no_remove = true;
        fs::write(&file, r#"{"Folder": "INBOX"}"#).unwrap();
        let fake = Fake::default();
        fake.run(&config, Command::Rescan { file: file.clone() })
            .unwrap();
        assert!(file.exists());
        assert_eq!(vec![config.rescand_url.clone()], *fake.urls.borrow());
        assert_eq!(
            Some(json!({ "Folder": "INBOX", "Username": "jdoe@example.com" })),
            fake.requests.borrow()[0].body
        );

        fs::write(&file, "[1, 2]").unwrap();
        assert_matches!(
            Err(Error::Payload(..)),
            fake.run(&config, Command::Rescan { file: file.clone() })
        );
        fs::write(&file, "not json").unwrap();
        assert_matches!(
            Err(Error::Payload(..)),
            fake.run(&config, Command::Restore { file })
        );
    }

    #[test]
    fn rescan_status() {
        let fake = Fake::default();
        fake.run(&config(), Command::Rescanstatus { id: None })
            .unwrap();
        fake.run(
            &config(),
            Command::Rescanstatus {
                id: Some("42".to_owned()),
            },
        )
        .unwrap();
        assert_eq!(
            vec![
                (Method::GET, "/rescan/".to_owned()),
                (Method::GET, "/rescan/42/".to_owned()),
            ],
            fake.paths()
        );
    }
}
