//! Blocking Appium (W3C WebDriver) client implementing [`UiDriver`].

use base64::{engine::general_purpose, Engine as _};
use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::retry::{poll_until, with_retry, RetryConfig};
use super::{DriverResult, UiDriver, UiElement};
use crate::config::GraphConfig;
use crate::error::DriverError;

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SWIPE_DURATION_MS: u64 = 400;

#[derive(Debug, Clone, Copy, Deserialize)]
struct Rect {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    width: f64,
    height: f64,
}

impl Rect {
    fn center(&self) -> (i32, i32) {
        ((self.x + self.width / 2.0) as i32, (self.y + self.height / 2.0) as i32)
    }
}

pub struct AppiumDriver {
    client: Client,
    server: String,
    session_id: String,
    device_id: String,
    app_package: String,
    implicit_wait: Duration,
    retry: RetryConfig,
}

impl AppiumDriver {
    /// Open an Appium session for `device_id` on the configured server.
    pub fn connect(config: &GraphConfig, device_id: &str, app_package: &str) -> DriverResult<Self> {
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let server = config.appium_server.trim_end_matches('/').to_string();
        let retry = RetryConfig::default();

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "platformName": "Android",
                    "appium:automationName": "UiAutomator2",
                    "appium:udid": device_id,
                    "appium:noReset": true,
                    "appium:newCommandTimeout": 1200
                },
                "firstMatch": [{}]
            }
        });
        let url = format!("{}/session", server);
        let value = with_retry(&retry, "create session", || {
            let resp = client.post(&url).json(&capabilities).send()?;
            unwrap_response(resp)
        })?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| DriverError::Protocol(format!("no sessionId in response: {}", value)))?
            .to_string();
        info!("[Appium] Session {} opened for device {} ({})", session_id, device_id, app_package);

        let driver = Self {
            client,
            server,
            session_id,
            device_id: device_id.to_string(),
            app_package: app_package.to_string(),
            implicit_wait: config.implicit_wait,
            retry,
        };
        // presence is polled locally, the server must answer immediately
        driver.call(Method::POST, "/timeouts", Some(json!({ "implicit": 0 })))?;
        Ok(driver)
    }

    /// Session command. Only lookups are retried on transport failures; a
    /// gesture whose response got lost may already have happened on the device.
    fn call(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        let url = format!("{}/session/{}{}", self.server, self.session_id, path);
        let send = || {
            let mut request = self.client.request(method.clone(), &url);
            if let Some(body) = &body {
                request = request.json(body);
            }
            unwrap_response(request.send()?)
        };
        if is_lookup(&method, path) {
            with_retry(&self.retry, path, send)
        } else {
            send()
        }
    }

    fn find_elements(&self, locator: &str) -> DriverResult<Vec<String>> {
        let value = self.call(
            Method::POST,
            "/elements",
            Some(json!({ "using": "xpath", "value": locator })),
        )?;
        let elements = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item[ELEMENT_KEY].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(elements)
    }

    /// First element matching `locator`, waiting up to the implicit wait.
    fn find_element(&self, locator: &str) -> DriverResult<String> {
        let mut found = None;
        poll_until(self.implicit_wait, POLL_INTERVAL, || {
            found = self.find_elements(locator)?.into_iter().next();
            Ok(found.is_some())
        })?;
        found.ok_or_else(|| DriverError::click_failure(locator, "element not present"))
    }

    fn element_call(&self, locator: &str, element: &str, method: Method, suffix: &str, body: Option<Value>) -> DriverResult<Value> {
        let path = format!("/element/{}{}", element, suffix);
        self.call(method, &path, body).map_err(|e| with_locator(e, locator))
    }

    fn element_rect(&self, locator: &str, element: &str) -> DriverResult<Rect> {
        let value = self.element_call(locator, element, Method::GET, "/rect", None)?;
        serde_json::from_value(value).map_err(|e| DriverError::Protocol(format!("bad element rect: {}", e)))
    }

    fn window_rect(&self) -> DriverResult<Rect> {
        let value = self.call(Method::GET, "/window/rect", None)?;
        serde_json::from_value(value).map_err(|e| DriverError::Protocol(format!("bad window rect: {}", e)))
    }

    fn pointer(&self, steps: Vec<Value>) -> DriverResult<()> {
        let body = json!({
            "actions": [{
                "type": "pointer",
                "id": "finger1",
                "parameters": { "pointerType": "touch" },
                "actions": steps
            }]
        });
        self.call(Method::POST, "/actions", Some(body))?;
        Ok(())
    }

    fn press_at(&self, x: i32, y: i32, hold: Duration) -> DriverResult<()> {
        self.pointer(vec![
            json!({ "type": "pointerMove", "duration": 0, "x": x, "y": y }),
            json!({ "type": "pointerDown", "button": 0 }),
            json!({ "type": "pause", "duration": hold.as_millis() as u64 }),
            json!({ "type": "pointerUp", "button": 0 }),
        ])
    }

    fn swipe_up(&self) -> DriverResult<()> {
        let window = self.window_rect()?;
        let x = (window.width / 2.0) as i32;
        let from_y = (window.height * 0.8) as i32;
        let to_y = (window.height * 0.2) as i32;
        self.pointer(vec![
            json!({ "type": "pointerMove", "duration": 0, "x": x, "y": from_y }),
            json!({ "type": "pointerDown", "button": 0 }),
            json!({ "type": "pointerMove", "duration": SWIPE_DURATION_MS, "x": x, "y": to_y }),
            json!({ "type": "pointerUp", "button": 0 }),
        ])
    }

    fn app_call(&self, endpoint: &str) -> DriverResult<()> {
        self.call(
            Method::POST,
            &format!("/appium/device/{}", endpoint),
            Some(json!({ "appId": self.app_package })),
        )?;
        Ok(())
    }
}

impl Drop for AppiumDriver {
    fn drop(&mut self) {
        let url = format!("{}/session/{}", self.server, self.session_id);
        if let Err(e) = self.client.delete(&url).send() {
            debug!("[Appium] Could not close session {}: {}", self.session_id, e);
        }
    }
}

impl std::fmt::Debug for AppiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AppiumDriver {} for app package {}", self.device_id, self.app_package)
    }
}

pub struct AppiumElement<'a> {
    driver: &'a AppiumDriver,
    id: String,
    locator: String,
}

impl UiElement for AppiumElement<'_> {
    fn attribute(&self, name: &str) -> DriverResult<Option<String>> {
        let value = self.driver.element_call(
            &self.locator,
            &self.id,
            Method::GET,
            &format!("/attribute/{}", name),
            None,
        )?;
        Ok(value.as_str().map(str::to_string))
    }

    fn text(&self) -> DriverResult<String> {
        let value = self.driver.element_call(&self.locator, &self.id, Method::GET, "/text", None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn click(&self) -> DriverResult<()> {
        self.driver.element_call(&self.locator, &self.id, Method::POST, "/click", Some(json!({})))?;
        Ok(())
    }
}

impl UiDriver for AppiumDriver {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn app_package(&self) -> &str {
        &self.app_package
    }

    fn is_present(&self, locator: &str, wait: Duration) -> DriverResult<bool> {
        poll_until(wait, POLL_INTERVAL, || Ok(!self.find_elements(locator)?.is_empty()))
    }

    fn click(&self, locator: &str) -> DriverResult<()> {
        let element = self.find_element(locator)?;
        self.element_call(locator, &element, Method::POST, "/click", Some(json!({})))?;
        Ok(())
    }

    fn send_keys(&self, locator: &str, text: &str) -> DriverResult<()> {
        let element = self.find_element(locator)?;
        self.element_call(locator, &element, Method::POST, "/value", Some(json!({ "text": text })))?;
        Ok(())
    }

    fn long_press(&self, locator: &str, duration: Duration) -> DriverResult<()> {
        let element = self.find_element(locator)?;
        let (x, y) = self.element_rect(locator, &element)?.center();
        self.press_at(x, y, duration)
    }

    fn swipe_and_retry(&self, locator: &str, max_attempts: usize) -> DriverResult<()> {
        for attempt in 0..max_attempts {
            if self.is_present(locator, Duration::ZERO)? {
                return self.click(locator);
            }
            debug!("[Appium] '{}' not visible, swiping ({}/{})", locator, attempt + 1, max_attempts);
            self.swipe_up()?;
        }
        if self.is_present(locator, Duration::ZERO)? {
            return self.click(locator);
        }
        Err(DriverError::click_failure(
            locator,
            format!("not found after {} swipes", max_attempts),
        ))
    }

    fn get_element<'a>(&'a self, locator: &str) -> DriverResult<Box<dyn UiElement + 'a>> {
        let id = self.find_element(locator)?;
        Ok(Box::new(AppiumElement {
            driver: self,
            id,
            locator: locator.to_string(),
        }))
    }

    fn activate_app(&self) -> DriverResult<()> {
        self.app_call("activate_app")
    }

    fn terminate_app(&self) -> DriverResult<()> {
        self.app_call("terminate_app")
    }

    fn app_is_foreground(&self) -> DriverResult<bool> {
        let value = self.call(Method::GET, "/appium/device/current_package", None)?;
        Ok(value.as_str() == Some(self.app_package.as_str()))
    }

    fn press_keycode(&self, code: u32) -> DriverResult<()> {
        self.call(
            Method::POST,
            "/appium/device/press_keycode",
            Some(json!({ "keycode": code })),
        )?;
        Ok(())
    }

    fn tap(&self, x: i32, y: i32) -> DriverResult<()> {
        self.press_at(x, y, Duration::from_millis(50))
    }

    fn screenshot(&self) -> DriverResult<Vec<u8>> {
        let value = self.call(Method::GET, "/screenshot", None)?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::Protocol("screenshot response is not a string".into()))?;
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::Protocol(format!("bad screenshot encoding: {}", e)))
    }
}

/// Extract `value` from a W3C response, mapping error payloads.
fn unwrap_response(resp: reqwest::blocking::Response) -> DriverResult<Value> {
    let status = resp.status();
    let status_error = resp.error_for_status_ref().err();
    let mut payload: Value = resp.json().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(payload["value"].take());
    }
    let code = payload["value"]["error"].as_str().unwrap_or("").to_string();
    let message = payload["value"]["message"].as_str().unwrap_or("").to_string();
    match map_w3c_error(&code, &message) {
        Some(err) => Err(err),
        None => match status_error {
            Some(e) if status.is_server_error() => Err(DriverError::Http(e)),
            _ => Err(DriverError::Protocol(format!("{} {}: {}", status, code, message))),
        },
    }
}

fn map_w3c_error(code: &str, message: &str) -> Option<DriverError> {
    match code {
        "no such element"
        | "stale element reference"
        | "element not interactable"
        | "element click intercepted" => Some(DriverError::click_failure("", format!("{}: {}", code, message))),
        "invalid session id" => Some(DriverError::Session(message.to_string())),
        _ => None,
    }
}

/// Requests without side effects on the device.
fn is_lookup(method: &Method, path: &str) -> bool {
    *method == Method::GET || (*method == Method::POST && path == "/elements")
}

fn with_locator(error: DriverError, locator: &str) -> DriverError {
    match error {
        DriverError::ClickFailure { reason, .. } => DriverError::click_failure(locator, reason),
        other => other,
    }
}
