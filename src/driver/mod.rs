//! UI driver seam.
//!
//! The navigation engine never talks to a device directly; every query and
//! gesture goes through [`UiDriver`]. Locators are opaque strings (XPath for
//! the Appium backend) and are never interpreted by the engine.

pub mod appium;
pub mod retry;

use std::time::Duration;

use crate::error::DriverError;

pub use appium::AppiumDriver;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Android key codes used by the default gestures.
pub mod keycode {
    pub const HOME: u32 = 3;
    pub const BACK: u32 = 4;
    pub const ENTER: u32 = 66;
}

/// Handle to an element found on screen.
pub trait UiElement {
    fn attribute(&self, name: &str) -> DriverResult<Option<String>>;

    fn text(&self) -> DriverResult<String> {
        Ok(self.attribute("text")?.unwrap_or_default())
    }

    fn click(&self) -> DriverResult<()>;
}

/// Capability contract the engine needs from a device automation backend.
///
/// Implementations do their own bounded retries and report a target that
/// could not be found or acted on as [`DriverError::ClickFailure`].
pub trait UiDriver {
    fn device_id(&self) -> &str;

    fn app_package(&self) -> &str;

    /// Whether `locator` matches at least one element, waiting up to `wait`.
    fn is_present(&self, locator: &str, wait: Duration) -> DriverResult<bool>;

    fn click(&self, locator: &str) -> DriverResult<()>;

    fn send_keys(&self, locator: &str, text: &str) -> DriverResult<()>;

    fn long_press(&self, locator: &str, duration: Duration) -> DriverResult<()>;

    /// Swipe up until `locator` shows up, then click it.
    fn swipe_and_retry(&self, locator: &str, max_attempts: usize) -> DriverResult<()>;

    fn get_element<'a>(&'a self, locator: &str) -> DriverResult<Box<dyn UiElement + 'a>>;

    fn activate_app(&self) -> DriverResult<()>;

    fn terminate_app(&self) -> DriverResult<()>;

    fn restart_app(&self) -> DriverResult<()> {
        self.terminate_app()?;
        self.activate_app()
    }

    fn app_is_foreground(&self) -> DriverResult<bool>;

    fn press_keycode(&self, code: u32) -> DriverResult<()>;

    fn back(&self) -> DriverResult<()> {
        self.press_keycode(keycode::BACK)
    }

    fn home(&self) -> DriverResult<()> {
        self.press_keycode(keycode::HOME)
    }

    fn press_enter(&self) -> DriverResult<()> {
        self.press_keycode(keycode::ENTER)
    }

    fn tap(&self, x: i32, y: i32) -> DriverResult<()>;

    /// PNG bytes of the current screen.
    fn screenshot(&self) -> DriverResult<Vec<u8>>;
}

/// Presence check without waiting, the form state validators use.
pub fn present_now(driver: &dyn UiDriver, locator: &str) -> DriverResult<bool> {
    driver.is_present(locator, Duration::ZERO)
}

/// Whether every locator is present on screen right now.
pub fn all_present(driver: &dyn UiDriver, locators: &[String]) -> DriverResult<bool> {
    for locator in locators {
        if !present_now(driver, locator)? {
            return Ok(false);
        }
    }
    Ok(true)
}
