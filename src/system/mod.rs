//! Administration services: runtime settings, audit trail, accounts,
//! backups and periodic maintenance.

pub mod accounts;
pub mod audit;
pub mod backup;
pub mod categories;
pub mod maintenance;
pub mod settings;

pub use accounts::{NewUser, create_account, ensure_unique_identity, generate_password};
pub use audit::Actor;
pub use categories::seed_default_categories;
pub use maintenance::{Maintenance, MaintenanceReport, cleanup_expired_shares};
pub use settings::{DEFAULT_SETTINGS, RuntimeSettings, normalize_setting};
