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

//! Blocking JSON client for the filter configuration and rescan services.

use std::time::Duration;

use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::{Certificate, Identity, Method};
use serde_json::Value;

use super::error::Error;
use super::system_config::{read_config_file, SystemConfig};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A request to one of the services, independent of any connection.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        ApiRequest {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn put(path: impl Into<String>) -> Self {
        ApiRequest {
            method: Method::PUT,
            path: path.into(),
            body: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        ApiRequest {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        ApiRequest {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Something that answers `ApiRequest`s.
pub trait Service {
    fn send(&self, request: &ApiRequest) -> Result<Value, Error>;
}

impl<S: Service + ?Sized> Service for &S {
    fn send(&self, request: &ApiRequest) -> Result<Value, Error> {
        (**self).send(request)
    }
}

#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    /// Build a client for the service at `base_url`.
    ///
    /// The client certificate and CA named by the configuration are only
    /// loaded for `https` URLs.
    pub fn new(config: &SystemConfig, base_url: &str) -> Result<Self, Error> {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);

        if base_url.starts_with("https:") {
            let mut pem = read_config_file("cert", &config.cert)?;
            pem.push(b'\n');
            pem.extend(read_config_file("key", &config.key)?);
            let identity = Identity::from_pem(&pem).map_err(|e| {
                Error::Config(format!(
                    "Error loading client certificate pair: {}",
                    e
                ))
            })?;

            let ca = read_config_file("ca", &config.ca)?;
            let ca = Certificate::from_pem(&ca).map_err(|e| {
                Error::Config(format!(
                    "Error loading certificate authority: {}",
                    e
                ))
            })?;

            builder = builder.identity(identity).add_root_certificate(ca);
        }

        Ok(ApiClient {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        })
    }
}

impl Service for ApiClient {
    /// Perform `request` and return the decoded JSON response.
    ///
    /// Statuses outside 2xx are errors, as are responses that are not JSON
    /// objects.
    fn send(&self, request: &ApiRequest) -> Result<Value, Error> {
        let url = format!("{}{}", self.base_url, request.path);
        info!("{} {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header("X-Api-Key", &self.api_key);
        if let Some(ref body) = request.body {
            debug!("Request body: {}", body);
            builder = builder.json(body);
        }

        let response = builder.send()?;
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .map(|v| message_of(&v).to_owned())
                .unwrap_or_default();
            return Err(Error::Api(format!(
                "{} {} returned status {}: {}",
                request.method, request.path, status, message
            )));
        }

        debug!("Response: {}", text);
        let value: Value = serde_json::from_str(&text)?;
        if !value.is_object() {
            return Err(Error::Api(format!(
                "{} {} returned a non-object response",
                request.method, request.path
            )));
        }
        Ok(value)
    }
}

/// Record the user and request a response was produced for.
pub fn stamp(response: &mut Value, user: &str, request_id: &str) {
    if let Value::Object(ref mut map) = *response {
        map.insert("User".to_owned(), Value::String(user.to_owned()));
        map.insert(
            "Request".to_owned(),
            Value::String(request_id.to_owned()),
        );
    }
}

/// Return the `Message` field of a response, or "".
pub fn message_of(response: &Value) -> &str {
    response
        .get("Message")
        .and_then(Value::as_str)
        .unwrap_or("")
}
