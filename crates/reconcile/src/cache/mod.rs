//! Caches shared by every resource in a cycle.

pub mod installed;
pub mod package_info;

pub use installed::{INSTALLED_TTL, InstalledCache, Manager};
pub use package_info::{PACKAGE_INFO_MAX_AGE_DAYS, PackageInfo, PackageInfoCache, key_for};
