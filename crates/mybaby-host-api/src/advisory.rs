//! Advisory request and placeholder fallback

use mybaby_api::{ControlMode, Device};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::AdvisoryService;

/// Shown to the operator when the advisory service fails
pub const ADVISOR_PLACEHOLDER: &str =
    "AI Advisor is currently unavailable. Please try again later.";

/// Snapshot of a device sent to the advisory service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryRequest {
    pub device_name: String,
    pub mac: String,
    pub mode: ControlMode,
    pub time_used_today: u32,
    /// Today's quota limit, quota mode only
    pub daily_limit_minutes: Option<u32>,
    /// Windows as `HH:MM-HH:MM`, schedule mode only
    pub windows: Vec<String>,
    /// Names of enabled platforms the device is governed by
    pub platforms: Vec<String>,
}

impl AdvisoryRequest {
    pub fn for_device(
        device: &Device,
        daily_limit_minutes: Option<u32>,
        platforms: Vec<String>,
    ) -> Self {
        Self {
            device_name: device.name.clone(),
            mac: device.mac.to_string(),
            mode: device.mode(),
            time_used_today: device.time_used_today,
            daily_limit_minutes,
            windows: device
                .schedules()
                .unwrap_or_default()
                .iter()
                .map(|w| format!("{}-{}", w.start, w.end))
                .collect(),
            platforms,
        }
    }

    /// Natural-language prompt for text-generation backends
    pub fn prompt(&self) -> String {
        let mut prompt = format!(
            "The user is managing a device named \"{}\" with MAC {}.\n",
            self.device_name, self.mac
        );
        prompt.push_str(&format!("Current control mode: {}.\n", self.mode));
        prompt.push_str(&format!(
            "Current usage today: {} minutes.\n",
            self.time_used_today
        ));
        if let Some(limit) = self.daily_limit_minutes {
            prompt.push_str(&format!("Daily limit today: {} minutes.\n", limit));
        }
        if !self.windows.is_empty() {
            prompt.push_str(&format!("Allowed windows: {}.\n", self.windows.join(", ")));
        }
        prompt.push_str(&format!("Monitored platforms: {}.\n\n", self.platforms.join(", ")));
        prompt.push_str(
            "The child using this device is likely watching short videos or playing games. \
             Give 3-4 professional and empathetic parenting tips for setting healthy boundaries, \
             and suggest a specific time quota or schedule window if the current one seems too \
             loose or too strict. Keep the tone encouraging.",
        );
        prompt
    }
}

/// Ask the advisory service, substituting the placeholder on failure.
///
/// Returns the text and whether it is the placeholder.
pub async fn advice_or_placeholder(
    service: &dyn AdvisoryService,
    request: &AdvisoryRequest,
) -> (String, bool) {
    match service.advise(request).await {
        Ok(text) if !text.trim().is_empty() => (text, false),
        Ok(_) => {
            warn!(device = %request.device_name, "Advisory service returned empty text");
            (ADVISOR_PLACEHOLDER.to_string(), true)
        }
        Err(e) => {
            warn!(device = %request.device_name, error = %e, "Advisory service failed");
            (ADVISOR_PLACEHOLDER.to_string(), true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockAdvisor;
    use mybaby_api::{DeviceControl, DeviceStatus, ScheduleWindow};
    use mybaby_util::{DaySet, DeviceId, MacAddress, WallClock, WindowId};

    fn tablet() -> Device {
        Device {
            id: DeviceId::new("d2"),
            mac: MacAddress::parse("AC:BC:32:00:FF:12").unwrap(),
            name: "Tablet".into(),
            control: DeviceControl::Schedule {
                schedules: vec![ScheduleWindow {
                    id: WindowId::new("s1"),
                    start: WallClock::new(18, 30).unwrap(),
                    end: WallClock::new(20, 0).unwrap(),
                    days: DaySet::WEEKDAYS,
                }],
            },
            platform_ids: None,
            time_used_today: 25,
            status: DeviceStatus::Online,
            last_seen: None,
        }
    }

    #[test]
    fn prompt_mentions_device_and_platforms() {
        let request =
            AdvisoryRequest::for_device(&tablet(), None, vec!["Douyin".into(), "Bilibili".into()]);
        let prompt = request.prompt();

        assert!(prompt.contains("\"Tablet\""));
        assert!(prompt.contains("AC:BC:32:00:FF:12"));
        assert!(prompt.contains("schedule"));
        assert!(prompt.contains("25 minutes"));
        assert!(prompt.contains("18:30-20:00"));
        assert!(prompt.contains("Douyin, Bilibili"));
    }

    #[tokio::test]
    async fn failure_degrades_to_placeholder() {
        let request = AdvisoryRequest::for_device(&tablet(), None, vec![]);

        let advisor = MockAdvisor::failing();
        let (text, degraded) = advice_or_placeholder(&advisor, &request).await;
        assert!(degraded);
        assert_eq!(text, ADVISOR_PLACEHOLDER);

        let advisor = MockAdvisor::replying("Try a 45 minute weekday limit.");
        let (text, degraded) = advice_or_placeholder(&advisor, &request).await;
        assert!(!degraded);
        assert!(text.contains("45 minute"));
    }
}
