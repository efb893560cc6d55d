//! Built-in catalogue of public download test files.
//!
//! Users pick an entry by id as their download test preference; the probe
//! runner resolves the preference through [`find_enabled`].

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedTestUrl {
    pub id: &'static str,
    pub name: &'static str,
    pub url: &'static str,
    pub size_bytes: u64,
    pub provider: &'static str,
    pub region: &'static str,
    pub enabled: bool,
    pub priority: u8,
}

const MB: u64 = 1024 * 1024;

pub const CATALOGUE: &[SpeedTestUrl] = &[
    SpeedTestUrl {
        id: "cachefly-10mb",
        name: "CacheFly 10MB",
        url: "http://cachefly.cachefly.net/10mb.test",
        size_bytes: 10 * MB,
        provider: "CacheFly",
        region: "Global CDN",
        enabled: true,
        priority: 1,
    },
    SpeedTestUrl {
        id: "cachefly-100mb",
        name: "CacheFly 100MB",
        url: "http://cachefly.cachefly.net/100mb.test",
        size_bytes: 100 * MB,
        provider: "CacheFly",
        region: "Global CDN",
        enabled: true,
        priority: 2,
    },
    SpeedTestUrl {
        id: "cachefly-1gb",
        name: "CacheFly 1GB",
        url: "http://cachefly.cachefly.net/1gb.test",
        size_bytes: 1024 * MB,
        provider: "CacheFly",
        region: "Global CDN",
        enabled: true,
        priority: 3,
    },
    SpeedTestUrl {
        id: "thinkbroadband-5mb",
        name: "ThinkBroadband 5MB",
        url: "http://ipv4.download.thinkbroadband.com/5MB.zip",
        size_bytes: 5 * MB,
        provider: "ThinkBroadband",
        region: "UK",
        enabled: true,
        priority: 4,
    },
    SpeedTestUrl {
        id: "thinkbroadband-50mb",
        name: "ThinkBroadband 50MB",
        url: "http://ipv4.download.thinkbroadband.com/50MB.zip",
        size_bytes: 50 * MB,
        provider: "ThinkBroadband",
        region: "UK",
        enabled: true,
        priority: 5,
    },
    SpeedTestUrl {
        id: "thinkbroadband-200mb",
        name: "ThinkBroadband 200MB",
        url: "http://ipv4.download.thinkbroadband.com/200MB.zip",
        size_bytes: 200 * MB,
        provider: "ThinkBroadband",
        region: "UK",
        enabled: true,
        priority: 6,
    },
];

/// Look up an enabled catalogue entry by id.
pub fn find_enabled(id: &str) -> Option<&'static SpeedTestUrl> {
    CATALOGUE.iter().find(|entry| entry.enabled && entry.id == id)
}

/// Enabled entries ordered by priority.
pub fn enabled() -> Vec<&'static SpeedTestUrl> {
    let mut entries: Vec<_> = CATALOGUE.iter().filter(|e| e.enabled).collect();
    entries.sort_by_key(|e| e.priority);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_known_entry() {
        let entry = find_enabled("cachefly-100mb").expect("entry exists");
        assert_eq!(entry.url, "http://cachefly.cachefly.net/100mb.test");
    }

    #[test]
    fn unknown_id_is_none() {
        assert!(find_enabled("nope").is_none());
    }

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<_> = CATALOGUE.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CATALOGUE.len());
    }

    #[test]
    fn enabled_is_priority_ordered() {
        let priorities: Vec<_> = enabled().iter().map(|e| e.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
    }
}
