//! Namespace profiles.
//!
//! Two dialects are in circulation: the legacy profile where response and
//! scan elements share one namespace, and the 2.0 profile which splits
//! response, scan and diagnostic elements into three namespaces. The profile
//! in effect is chosen by sniffing the namespace of the response root.

/// Legacy (1.x) response and scan namespace
pub const LEGACY_NS: &str = "http://www.loc.gov/zing/srw/";
/// Legacy (1.x) diagnostic namespace
pub const LEGACY_DIAGNOSTIC_NS: &str = "http://www.loc.gov/zing/srw/diagnostic/";

/// 2.0 response namespace
pub const SRU2_RESPONSE_NS: &str = "http://docs.oasis-open.org/ns/search-ws/sruResponse";
/// 2.0 scan namespace
pub const SRU2_SCAN_NS: &str = "http://docs.oasis-open.org/ns/search-ws/scan";
/// 2.0 diagnostic namespace
pub const SRU2_DIAGNOSTIC_NS: &str = "http://docs.oasis-open.org/ns/search-ws/diagnostic";

/// Immutable set of namespaces used by one protocol dialect
#[derive(Debug, PartialEq, Eq)]
pub struct NamespaceProfile {
    pub name: &'static str,
    pub response_ns: &'static str,
    pub scan_ns: &'static str,
    pub diagnostic_ns: &'static str,
}

/// The legacy single-namespace profile
pub static LEGACY_PROFILE: NamespaceProfile = NamespaceProfile {
    name: "legacy",
    response_ns: LEGACY_NS,
    scan_ns: LEGACY_NS,
    diagnostic_ns: LEGACY_DIAGNOSTIC_NS,
};

/// The 2.0 three-namespace profile
pub static SRU2_PROFILE: NamespaceProfile = NamespaceProfile {
    name: "2.0",
    response_ns: SRU2_RESPONSE_NS,
    scan_ns: SRU2_SCAN_NS,
    diagnostic_ns: SRU2_DIAGNOSTIC_NS,
};

impl NamespaceProfile {
    /// Select the profile owning `namespace`, if any
    pub fn detect(namespace: &str) -> Option<&'static NamespaceProfile> {
        [&LEGACY_PROFILE, &SRU2_PROFILE]
            .into_iter()
            .find(|profile| profile.contains(namespace))
    }

    /// Check if `namespace` belongs to this profile
    pub fn contains(&self, namespace: &str) -> bool {
        namespace == self.response_ns
            || namespace == self.scan_ns
            || namespace == self.diagnostic_ns
    }

    /// The profile a namespace-confused endpoint most likely meant instead
    pub fn other(&self) -> &'static NamespaceProfile {
        if self == &LEGACY_PROFILE {
            &SRU2_PROFILE
        } else {
            &LEGACY_PROFILE
        }
    }

    pub fn is_legacy(&self) -> bool {
        self == &LEGACY_PROFILE
    }
}
