#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AdminRoute {
    #[default]
    Dashboard,
    Users,
    Ghosts,
    Events,
    Reports,
    Settings,
    Locations,
    Logs,
    SystemLogs,
    UserDetail(String),
}

impl AdminRoute {
    /// Parses a location hash such as `#ghosts` or `#user-detail/abc`.
    /// Anything unrecognised lands on the dashboard.
    pub fn parse(hash: &str) -> Self {
        let route = hash.trim().trim_start_matches('#');
        if let Some(user_id) = route.strip_prefix("user-detail/") {
            let user_id = user_id.split('/').next().unwrap_or_default();
            if !user_id.is_empty() {
                return Self::UserDetail(user_id.to_string());
            }
            return Self::Users;
        }
        match route {
            "users" => Self::Users,
            "ghosts" => Self::Ghosts,
            "events" => Self::Events,
            "reports" => Self::Reports,
            "settings" => Self::Settings,
            "locations" => Self::Locations,
            "logs" => Self::Logs,
            "system-logs" => Self::SystemLogs,
            _ => Self::Dashboard,
        }
    }

    pub fn to_hash(&self) -> String {
        let route = match self {
            Self::Dashboard => "dashboard",
            Self::Users => "users",
            Self::Ghosts => "ghosts",
            Self::Events => "events",
            Self::Reports => "reports",
            Self::Settings => "settings",
            Self::Locations => "locations",
            Self::Logs => "logs",
            Self::SystemLogs => "system-logs",
            Self::UserDetail(user_id) => return format!("#user-detail/{user_id}"),
        };
        format!("#{route}")
    }

    /// Permission an admin needs to open the route.
    pub fn required_permission(&self) -> Option<&'static str> {
        match self {
            Self::Dashboard => None,
            Self::Users | Self::UserDetail(_) => Some("users"),
            Self::Ghosts => Some("ghosts"),
            Self::Events => Some("events"),
            Self::Reports => Some("reports"),
            Self::Settings => Some("settings"),
            Self::Locations => Some("locations"),
            Self::Logs | Self::SystemLogs => Some("logs"),
        }
    }
}
