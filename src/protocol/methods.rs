//! Method name constants and the method registry.
//!
//! The registry is the single source of truth for what kind of message a
//! method name denotes and which negotiated server capability, if any, must
//! be present before the client may send it. Unknown request methods pass the
//! gate for forward compatibility; unknown notifications are dropped by the
//! router.

use crate::protocol::types::ServerCapabilities;

// Core protocol methods
pub const INITIALIZE: &str = "initialize";
pub const PING: &str = "ping";

// Tool-related methods
pub const TOOLS_LIST: &str = "tools/list";
pub const TOOLS_CALL: &str = "tools/call";

// Resource-related methods
pub const RESOURCES_LIST: &str = "resources/list";
pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
pub const RESOURCES_READ: &str = "resources/read";
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

// Prompt-related methods
pub const PROMPTS_LIST: &str = "prompts/list";
pub const PROMPTS_GET: &str = "prompts/get";

// Logging and completion
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
pub const COMPLETION_COMPLETE: &str = "completion/complete";

// Server-to-client requests
pub const ROOTS_LIST: &str = "roots/list";
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";

// Notifications
pub const INITIALIZED: &str = "notifications/initialized";
pub const CANCELLED: &str = "notifications/cancelled";
pub const PROGRESS: &str = "notifications/progress";
pub const LOGGING_MESSAGE: &str = "notifications/message";
pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
pub const ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

/// Every request method the registry knows about.
pub const KNOWN_REQUESTS: &[&str] = &[
    INITIALIZE,
    PING,
    TOOLS_LIST,
    TOOLS_CALL,
    RESOURCES_LIST,
    RESOURCES_TEMPLATES_LIST,
    RESOURCES_READ,
    RESOURCES_SUBSCRIBE,
    RESOURCES_UNSUBSCRIBE,
    PROMPTS_LIST,
    PROMPTS_GET,
    LOGGING_SET_LEVEL,
    COMPLETION_COMPLETE,
    ROOTS_LIST,
    SAMPLING_CREATE_MESSAGE,
];

/// Every notification method the registry knows about.
pub const KNOWN_NOTIFICATIONS: &[&str] = &[
    INITIALIZED,
    CANCELLED,
    PROGRESS,
    LOGGING_MESSAGE,
    RESOURCES_LIST_CHANGED,
    RESOURCES_UPDATED,
    PROMPTS_LIST_CHANGED,
    TOOLS_LIST_CHANGED,
    ROOTS_LIST_CHANGED,
];

/// The server capability family a method is gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// prompts/*
    Prompts,
    /// resources/* except subscribe
    Resources,
    /// resources/subscribe, additionally needs the subscribe sub-flag
    ResourcesSubscribe,
    /// tools/*
    Tools,
    /// logging/setLevel
    Logging,
}

impl CapabilityKind {
    /// Whether the negotiated server capabilities satisfy this requirement.
    pub fn advertised_by(&self, caps: &ServerCapabilities) -> bool {
        match self {
            CapabilityKind::Prompts => caps.prompts.is_some(),
            CapabilityKind::Resources => caps.resources.is_some(),
            CapabilityKind::ResourcesSubscribe => caps
                .resources
                .as_ref()
                .is_some_and(|r| r.subscribe.unwrap_or(false)),
            CapabilityKind::Tools => caps.tools.is_some(),
            CapabilityKind::Logging => caps.logging.is_some(),
        }
    }

    /// Short name used in gate error messages.
    pub fn feature_name(&self) -> &'static str {
        match self {
            CapabilityKind::Prompts => "prompts",
            CapabilityKind::Resources => "resources",
            CapabilityKind::ResourcesSubscribe => "resource subscriptions",
            CapabilityKind::Tools => "tools",
            CapabilityKind::Logging => "logging",
        }
    }
}

/// The server capability a request method requires, if any.
///
/// `initialize`, `ping`, and `completion/complete` are always allowed.
/// Unknown methods return `None` so they pass through the gate unharmed.
pub fn required_capability(method: &str) -> Option<CapabilityKind> {
    match method {
        PROMPTS_LIST | PROMPTS_GET => Some(CapabilityKind::Prompts),
        RESOURCES_SUBSCRIBE => Some(CapabilityKind::ResourcesSubscribe),
        RESOURCES_LIST | RESOURCES_TEMPLATES_LIST | RESOURCES_READ | RESOURCES_UNSUBSCRIBE => {
            Some(CapabilityKind::Resources)
        }
        TOOLS_LIST | TOOLS_CALL => Some(CapabilityKind::Tools),
        LOGGING_SET_LEVEL => Some(CapabilityKind::Logging),
        _ => None,
    }
}

/// Whether a method name denotes a notification.
pub fn is_notification(method: &str) -> bool {
    method.starts_with("notifications/")
}

/// Whether the registry knows this request method.
pub fn is_known_request(method: &str) -> bool {
    KNOWN_REQUESTS.contains(&method)
}

/// Whether the registry knows this notification method.
pub fn is_known_notification(method: &str) -> bool {
    KNOWN_NOTIFICATIONS.contains(&method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{ResourcesCapability, ToolsCapability};

    #[test]
    fn notification_methods_carry_the_prefix() {
        for method in KNOWN_NOTIFICATIONS {
            assert!(is_notification(method), "not a notification: {method}");
        }
        for method in KNOWN_REQUESTS {
            assert!(!is_notification(method), "request misclassified: {method}");
        }
    }

    #[test]
    fn registry_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for method in KNOWN_REQUESTS.iter().chain(KNOWN_NOTIFICATIONS) {
            assert!(seen.insert(*method), "duplicate method: {method}");
        }
    }

    #[test]
    fn initialize_ping_and_completion_are_ungated() {
        assert_eq!(required_capability(INITIALIZE), None);
        assert_eq!(required_capability(PING), None);
        assert_eq!(required_capability(COMPLETION_COMPLETE), None);
    }

    #[test]
    fn unknown_methods_pass_the_gate() {
        assert_eq!(required_capability("vendor/custom"), None);
    }

    #[test]
    fn subscribe_needs_the_subscribe_sub_flag() {
        let listed_only = ServerCapabilities {
            resources: Some(ResourcesCapability {
                subscribe: None,
                list_changed: Some(true),
            }),
            ..Default::default()
        };
        assert!(CapabilityKind::Resources.advertised_by(&listed_only));
        assert!(!CapabilityKind::ResourcesSubscribe.advertised_by(&listed_only));

        let subscribable = ServerCapabilities {
            resources: Some(ResourcesCapability {
                subscribe: Some(true),
                list_changed: None,
            }),
            ..Default::default()
        };
        assert!(CapabilityKind::ResourcesSubscribe.advertised_by(&subscribable));
    }

    #[test]
    fn tools_methods_are_gated_on_tools() {
        assert_eq!(required_capability(TOOLS_CALL), Some(CapabilityKind::Tools));
        let caps = ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            ..Default::default()
        };
        assert!(CapabilityKind::Tools.advertised_by(&caps));
        assert!(!CapabilityKind::Prompts.advertised_by(&caps));
    }
}
