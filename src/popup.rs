use log::{debug, info};
use std::fmt;
use std::sync::Arc;

use crate::driver::{self, DriverResult, UiDriver};

type Probe = Arc<dyn Fn(&dyn UiDriver) -> DriverResult<bool> + Send + Sync>;
type Dismiss = Arc<dyn Fn(&dyn UiDriver) -> DriverResult<()> + Send + Sync>;

/// Recognises an interstitial (update dialog, permission prompt, ...) and
/// gets rid of it. Only consulted during recovery.
#[derive(Clone)]
pub struct PopupHandler {
    name: String,
    recognize: Probe,
    dismiss: Dismiss,
}

impl PopupHandler {
    /// Popup recognised by one locator and dismissed by clicking another.
    pub fn new(recognize_locator: &str, dismiss_locator: &str) -> Self {
        let recognize = recognize_locator.to_string();
        let dismiss = dismiss_locator.to_string();
        Self {
            name: recognize_locator.to_string(),
            recognize: Arc::new(move |d: &dyn UiDriver| driver::present_now(d, &recognize)),
            dismiss: Arc::new(move |d: &dyn UiDriver| d.click(&dismiss)),
        }
    }

    /// Popup whose recognising element is also the one to click.
    pub fn simple(locator: &str) -> Self {
        Self::new(locator, locator)
    }

    pub fn custom<R, X>(name: &str, recognize: R, dismiss: X) -> Self
    where
        R: Fn(&dyn UiDriver) -> DriverResult<bool> + Send + Sync + 'static,
        X: Fn(&dyn UiDriver) -> DriverResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            recognize: Arc::new(recognize),
            dismiss: Arc::new(dismiss),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Click failures while probing count as "not showing".
    pub fn is_showing(&self, driver: &dyn UiDriver) -> DriverResult<bool> {
        match (self.recognize)(driver) {
            Err(e) if e.is_click_failure() => Ok(false),
            other => other,
        }
    }

    pub fn dismiss(&self, driver: &dyn UiDriver) -> DriverResult<()> {
        (self.dismiss)(driver)
    }
}

impl fmt::Debug for PopupHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupHandler").field("name", &self.name).finish()
    }
}

/// Android system interstitials every app can run into.
pub fn builtin_popups() -> Vec<PopupHandler> {
    vec![
        PopupHandler::simple(r#"//android.widget.ImageView[@content-desc="Dismiss update dialog"]"#),
        PopupHandler::simple(
            r#"//android.widget.Button[@resource-id="com.android.permissioncontroller:id/permission_allow_foreground_only_button"]"#,
        ),
        PopupHandler::simple(
            r#"//android.widget.Button[@resource-id="com.android.permissioncontroller:id/permission_allow_button"]"#,
        ),
    ]
}

/// Outcome of one popup sweep.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    /// Names of the handlers that fired, in firing order.
    pub dismissed: Vec<String>,
    pub passes: usize,
    /// Whether the pass limit stopped the sweep before a clean pass.
    pub exhausted: bool,
}

/// Run every handler over the screen, dismissing what they recognise, until
/// a full pass dismisses nothing or `max_passes` passes have run.
pub fn sweep(driver: &dyn UiDriver, handlers: &[PopupHandler], max_passes: usize) -> DriverResult<SweepReport> {
    let mut report = SweepReport::default();
    loop {
        if report.passes >= max_passes {
            report.exhausted = true;
            return Ok(report);
        }
        report.passes += 1;
        let mut clicked = false;
        for handler in handlers {
            if handler.is_showing(driver)? {
                info!("[Popup] {}: dismissing '{}'", driver.device_id(), handler.name());
                handler.dismiss(driver)?;
                report.dismissed.push(handler.name().to_string());
                clicked = true;
            }
        }
        if !clicked {
            debug!("[Popup] {}: clean after {} pass(es)", driver.device_id(), report.passes);
            return Ok(report);
        }
    }
}
