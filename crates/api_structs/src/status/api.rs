use serde::{Deserialize, Serialize};

pub mod get_service_health {
    use super::*;

    #[derive(Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct APIResponse {
        pub message: String,
    }
}

pub mod get_healthcheck {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
    #[serde(rename_all = "lowercase")]
    pub enum HealthStatus {
        Healthy,
        Degraded,
        Unhealthy,
    }

    #[derive(Debug, Clone, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ComponentHealthDTO {
        pub component: String,
        pub status: HealthStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub message: Option<String>,
    }

    #[derive(Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct APIResponse {
        /// Worst status among the components
        pub status: HealthStatus,
        pub checks: Vec<ComponentHealthDTO>,
    }

    impl APIResponse {
        pub fn new(checks: Vec<ComponentHealthDTO>) -> Self {
            let status = checks
                .iter()
                .map(|c| c.status)
                .max()
                .unwrap_or(HealthStatus::Healthy);
            Self { status, checks }
        }
    }
}
