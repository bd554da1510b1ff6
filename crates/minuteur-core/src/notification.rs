//! Push notifications and notification clicks

use serde::{Deserialize, Serialize};

use crate::config::OfflineConfig;
use crate::events::Effect;

/// A notification ready to be displayed by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
    pub url: String,
}

/// A button shown on the notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// An open window of the application, controlled or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowClient {
    pub id: String,
    pub url: String,
    /// Whether the host can bring this window to the front
    #[serde(default = "default_focusable")]
    pub focusable: bool,
}

fn default_focusable() -> bool {
    true
}

/// A click on a displayed notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationClick {
    /// Action button chosen, `None` for a click on the notification body
    #[serde(default)]
    pub action: Option<String>,
    /// Every window client, including uncontrolled ones
    #[serde(default)]
    pub clients: Vec<WindowClient>,
}

/// Build the notification shown for a push message
///
/// The payload text becomes the body; without a payload the configured
/// default body is used.
pub fn build_notification(config: &OfflineConfig, payload: Option<&[u8]>) -> Notification {
    let settings = &config.notification;
    let body = match payload {
        Some(data) => String::from_utf8_lossy(data).into_owned(),
        None => settings.default_body.clone(),
    };

    Notification {
        title: settings.title.clone(),
        body,
        icon: settings.icon.clone(),
        badge: settings.badge.clone(),
        vibrate: settings.vibrate.clone(),
        data: NotificationData {
            url: settings.url.clone(),
        },
        actions: vec![NotificationAction {
            action: settings.open_action.clone(),
            title: settings.open_action_title.clone(),
            icon: settings.open_action_icon.clone(),
        }],
    }
}

/// Decide what a notification click does
///
/// The notification is always closed. A click on the body or on the open
/// action focuses the first application window, or opens a new one at the
/// app root when none is open.
pub fn route_click(config: &OfflineConfig, click: &NotificationClick) -> Vec<Effect> {
    let mut effects = vec![Effect::CloseNotification];

    let opens_app = match click.action.as_deref() {
        None | Some("") => true,
        Some(action) => action == config.notification.open_action,
    };
    if !opens_app {
        return effects;
    }

    let existing = click
        .clients
        .iter()
        .find(|c| c.focusable && c.url.contains(&config.client_url_marker));

    match existing {
        Some(client) => effects.push(Effect::FocusClient {
            id: client.id.clone(),
        }),
        None => effects.push(Effect::OpenWindow {
            url: config.scope.clone(),
        }),
    }

    effects
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(id: &str, url: &str) -> WindowClient {
        WindowClient {
            id: id.to_string(),
            url: url.to_string(),
            focusable: true,
        }
    }

    #[test]
    fn test_notification_with_payload() {
        let config = OfflineConfig::default();
        let notification = build_notification(&config, Some("Les pâtes sont prêtes".as_bytes()));

        assert_eq!(notification.title, "Minuteur Cuisine");
        assert_eq!(notification.body, "Les pâtes sont prêtes");
        assert_eq!(notification.icon, "./icon-192.png");
        assert_eq!(notification.badge, "./icon-72.png");
        assert_eq!(notification.vibrate, vec![300, 100, 300]);
        assert_eq!(notification.data.url, "./");
        assert_eq!(notification.actions.len(), 1);
        assert_eq!(notification.actions[0].action, "open");
        assert_eq!(notification.actions[0].title, "Ouvrir l'app");
    }

    #[test]
    fn test_notification_without_payload() {
        let notification = build_notification(&OfflineConfig::default(), None);
        assert_eq!(notification.body, "Minuteur terminé !");
    }

    #[test]
    fn test_click_focuses_matching_window() {
        let config = OfflineConfig::default();
        let click = NotificationClick {
            action: None,
            clients: vec![
                window("a", "http://localhost:8080/other"),
                WindowClient {
                    focusable: false,
                    ..window("b", "http://localhost:8080/minuteur/")
                },
                window("c", "http://localhost:8080/minuteur/index.html"),
                window("d", "http://localhost:8080/minuteur/"),
            ],
        };

        assert_eq!(
            route_click(&config, &click),
            vec![
                Effect::CloseNotification,
                Effect::FocusClient { id: "c".to_string() }
            ]
        );
    }

    #[test]
    fn test_click_opens_window_when_none_match() {
        let config = OfflineConfig::default();
        let click = NotificationClick {
            action: Some("open".to_string()),
            clients: vec![window("a", "http://localhost:8080/other")],
        };

        assert_eq!(
            route_click(&config, &click),
            vec![
                Effect::CloseNotification,
                Effect::OpenWindow { url: config.scope.clone() }
            ]
        );
    }

    #[test]
    fn test_other_action_only_closes() {
        let config = OfflineConfig::default();
        let click = NotificationClick {
            action: Some("snooze".to_string()),
            clients: vec![window("a", "http://localhost:8080/minuteur/")],
        };

        assert_eq!(route_click(&config, &click), vec![Effect::CloseNotification]);
    }
}
