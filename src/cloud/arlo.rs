// MIT License - Copyright (c) 2026 Peter Wright
// Arlo cloud session over the hmsweb JSON API

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::cloud::CloudSession;
use crate::config::ArloToml;
use crate::error::{BridgeError, Result};
use crate::mode::Mode;

const MODE_ID_DISARMED: &str = "mode0";
const MODE_ID_ARMED: &str = "mode1";

/// Standard `{success, data}` wrapper around every API response.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    user_id: String,
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Device {
    device_id: String,
    #[serde(default)]
    device_name: String,
    device_type: String,
    #[serde(rename = "xCloudId", default)]
    x_cloud_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveAutomation {
    gateway_id: String,
    #[serde(default)]
    active_modes: Vec<String>,
}

#[derive(Debug, Clone)]
struct Auth {
    user_id: String,
    token: String,
}

/// Session with the Arlo cloud, bound to the first base station on the account.
pub struct ArloSession {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    auth: Option<Auth>,
    station: Option<Device>,
}

impl ArloSession {
    pub fn new(settings: &ArloToml) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            auth: None,
            station: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self) -> Result<&Auth> {
        self.auth.as_ref().ok_or_else(|| BridgeError::Cloud {
            reason: "not logged in".to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let auth = self.auth()?;
        let response = self
            .http
            .get(self.url(path))
            .header("Authorization", &auth.token)
            .send()
            .await?
            .error_for_status()?;
        unwrap_envelope(response.json().await?)
    }

    async fn fetch_base_station(&self) -> Result<Device> {
        let devices: Vec<Device> = self.get("/users/devices").await?;
        pick_base_station(devices).ok_or(BridgeError::NoBaseStation)
    }
}

#[async_trait]
impl CloudSession for ArloSession {
    fn station_name(&self) -> &str {
        self.station
            .as_ref()
            .map(|s| s.device_name.as_str())
            .unwrap_or("arlo")
    }

    async fn login(&mut self) -> Result<()> {
        debug!("Logging in to Arlo as {}", self.username);
        self.auth = None;

        let response = self
            .http
            .post(self.url("/login/v2"))
            .json(&json!({ "email": self.username, "password": self.password }))
            .send()
            .await?
            .error_for_status()?;
        let data: LoginData = unwrap_envelope(response.json().await?)?;
        self.auth = Some(Auth {
            user_id: data.user_id,
            token: data.token,
        });

        let station = self.fetch_base_station().await?;
        info!(
            "Logged in to Arlo, using base station {} ({})",
            station.device_name, station.device_id
        );
        self.station = Some(station);
        Ok(())
    }

    async fn current_mode(&mut self) -> Result<Option<String>> {
        let Some(station) = self.station.as_ref() else {
            return Ok(None);
        };
        if self.auth.is_none() {
            return Ok(None);
        }
        let gateway_id = station.device_id.clone();
        let active: Vec<ActiveAutomation> = self.get("/users/devices/automation/active").await?;
        Ok(active_mode_for(&active, &gateway_id).map(mode_name))
    }

    async fn request_mode_change(&mut self, mode: Mode) -> Result<()> {
        let mode_id = mode_id(mode)?;
        let auth = self.auth()?.clone();
        let station = self.station.clone().ok_or(BridgeError::NoBaseStation)?;

        let body = json!({
            "from": format!("{}_web", auth.user_id),
            "to": station.device_id,
            "action": "set",
            "resource": "modes",
            "transId": format!("web!{}", Utc::now().timestamp_millis()),
            "publishResponse": true,
            "properties": { "active": mode_id },
        });

        let response = self
            .http
            .post(self.url(&format!("/users/devices/notify/{}", station.device_id)))
            .header("Authorization", &auth.token)
            .header("xcloudId", &station.x_cloud_id)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let _: Value = unwrap_envelope(response.json().await?)?;
        Ok(())
    }
}

fn unwrap_envelope<T: DeserializeOwned>(envelope: Envelope) -> Result<T> {
    if !envelope.success {
        let reason = envelope
            .data
            .get("message")
            .or_else(|| envelope.data.get("reason"))
            .and_then(Value::as_str)
            .unwrap_or("request rejected")
            .to_string();
        return Err(BridgeError::Cloud { reason });
    }
    serde_json::from_value(envelope.data).map_err(|e| BridgeError::Cloud {
        reason: format!("unexpected response: {e}"),
    })
}

fn pick_base_station(devices: Vec<Device>) -> Option<Device> {
    devices
        .into_iter()
        .find(|d| d.device_type.eq_ignore_ascii_case("basestation"))
}

fn active_mode_for<'a>(active: &'a [ActiveAutomation], gateway_id: &str) -> Option<&'a str> {
    active
        .iter()
        .find(|a| a.gateway_id == gateway_id)
        .and_then(|a| a.active_modes.first())
        .map(String::as_str)
}

/// Map an Arlo mode id to the raw mode name understood by [`Mode::from_cloud`].
/// Custom modes are returned as their id.
fn mode_name(id: &str) -> String {
    match id {
        MODE_ID_DISARMED => "disarmed".to_string(),
        MODE_ID_ARMED => "armed".to_string(),
        other => other.to_string(),
    }
}

fn mode_id(mode: Mode) -> Result<&'static str> {
    match mode {
        Mode::Disarmed => Ok(MODE_ID_DISARMED),
        Mode::ArmedAway => Ok(MODE_ID_ARMED),
        other => Err(BridgeError::UnsupportedMode(other)),
    }
}
