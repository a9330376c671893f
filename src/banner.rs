//! Danger banner presentation state: one alert shown at a time, dismissible
//! by the user. Which alert out of many is shown is the caller's call.

use crate::models::{Severity, SystemAlert};

/// Banner accent color per severity. Unrecognized severities render with
/// the highest-severity styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerColor {
    Red,
    Orange,
    Yellow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerIcon {
    Fire,
    Warning,
    Ambulance,
    Siren,
}

pub fn severity_color(severity: Severity) -> BannerColor {
    match severity {
        Severity::High => BannerColor::Red,
        Severity::Medium => BannerColor::Orange,
        Severity::Low => BannerColor::Yellow,
        Severity::Unknown => BannerColor::Red,
    }
}

pub fn alert_icon(alert_type: Option<&str>) -> BannerIcon {
    match alert_type {
        Some("fire") => BannerIcon::Fire,
        Some("violence") => BannerIcon::Warning,
        Some("medical") => BannerIcon::Ambulance,
        Some("evacuation") => BannerIcon::Siren,
        _ => BannerIcon::Warning,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BannerState {
    Hidden,
    Visible(SystemAlert),
}

#[derive(Debug, Default)]
pub struct DangerBanner {
    state: BannerState,
}

impl Default for BannerState {
    fn default() -> Self {
        BannerState::Hidden
    }
}

impl DangerBanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the externally-selected current alert into the banner. A
    /// non-null alert is displayed; null hides it.
    pub fn observe(&mut self, active: Option<SystemAlert>) {
        self.state = match active {
            Some(alert) => BannerState::Visible(alert),
            None => BannerState::Hidden,
        };
    }

    /// User dismissal: back to hidden regardless of severity or type.
    pub fn dismiss(&mut self) {
        self.state = BannerState::Hidden;
    }

    pub fn state(&self) -> &BannerState {
        &self.state
    }

    pub fn visible_alert(&self) -> Option<&SystemAlert> {
        match &self.state {
            BannerState::Visible(alert) => Some(alert),
            BannerState::Hidden => None,
        }
    }
}
