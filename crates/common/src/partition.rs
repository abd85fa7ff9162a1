//! Deployment partition helpers
//!
//! Registries in isolated partitions live under a different DNS suffix, so the
//! private registry host can only be worked out once the region of the
//! executing environment is known.

/// Region prefix marking the isolated China partition
const ISOLATED_PARTITION_PREFIX: &str = "cn";

/// DNS suffix appended to registry hosts in the isolated partition
const ISOLATED_PARTITION_SUFFIX: &str = ".cn";

/// Registry URL suffix for a region
///
/// `"cn-north-1"` yields `".cn"`, every other region yields `""`.
pub fn registry_url_suffix(region: &str) -> &'static str {
    if region.starts_with(ISOLATED_PARTITION_PREFIX) {
        ISOLATED_PARTITION_SUFFIX
    } else {
        ""
    }
}

/// Host of the account's private registry in `region`
pub fn private_registry_host(account_id: &str, region: &str) -> String {
    format!(
        "{}.dkr.ecr.{}.amazonaws.com{}",
        account_id,
        region,
        registry_url_suffix(region)
    )
}
