//! Admin panel backend: sign-in and audit, catalog editing, dashboard
//! metrics, game settings and hash routing.

pub mod auth;
pub mod catalog;
pub mod dashboard;
pub mod routes;
pub mod settings;

pub use auth::{AdminAuth, IpLookup, IpifyLookup};
pub use catalog::{Catalog, CatalogRecord, EventManager, GhostManager, LocationManager};
pub use routes::AdminRoute;
pub use settings::SettingsManager;
