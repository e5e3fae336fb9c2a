//! Outbound identity rotation
//!
//! An identity is the proxy plus header set presented for one request.
//! Identities are drawn from the proxy pool crossed with the header templates.

use crate::config::{HeaderTemplate, RotationPolicy, SearchConfig};
use crate::crawler::rate_limiter::seeded_rng;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

/// Proxy and headers used for one outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Proxy descriptor, or `None` for a direct connection
    pub proxy: Option<String>,
    /// Complete header set for the request
    pub headers: BTreeMap<String, String>,
    template: usize,
}

impl Identity {
    /// A direct identity carrying only the given headers
    pub fn direct(headers: BTreeMap<String, String>) -> Self {
        Self {
            proxy: None,
            headers,
            template: 0,
        }
    }

    /// Index of the header template this identity was built from
    pub fn template_index(&self) -> usize {
        self.template
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ua#{}",
            self.proxy.as_deref().unwrap_or("direct"),
            self.template
        )
    }
}

/// Supplies a fresh identity per request
pub struct IdentityRotator {
    proxies: Vec<String>,
    templates: Vec<HeaderTemplate>,
    base_headers: BTreeMap<String, String>,
    policy: RotationPolicy,
    state: Mutex<RotatorState>,
}

struct RotatorState {
    cursor: usize,
    last: Option<(usize, usize)>,
    rng: StdRng,
}

impl IdentityRotator {
    pub fn new(
        proxies: Vec<String>,
        templates: Vec<HeaderTemplate>,
        base_headers: BTreeMap<String, String>,
        policy: RotationPolicy,
        seed: Option<u64>,
    ) -> Self {
        Self {
            proxies,
            templates,
            base_headers,
            policy,
            state: Mutex::new(RotatorState {
                cursor: 0,
                last: None,
                rng: seeded_rng(seed),
            }),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            config.proxy_pool.clone(),
            config.header_templates.clone(),
            config.request_headers_base.clone(),
            config.rotation,
            config.seed,
        )
    }

    /// Number of distinct proxy/template pairings
    pub fn pool_size(&self) -> usize {
        self.proxies.len().max(1) * self.templates.len().max(1)
    }

    /// Draws the next identity
    ///
    /// Round-robin walks every proxy x template pairing, proxy first; random
    /// sampling never returns the pairing drawn just before it. With more
    /// than one pairing available, two consecutive identities always differ.
    pub fn next(&self) -> Identity {
        let proxy_count = self.proxies.len().max(1);
        let template_count = self.templates.len().max(1);

        let (proxy_idx, template_idx) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let pair = match self.policy {
                RotationPolicy::RoundRobin => {
                    let n = state.cursor;
                    state.cursor = state.cursor.wrapping_add(1);
                    (n % proxy_count, (n / proxy_count) % template_count)
                }
                RotationPolicy::Random => {
                    let combos = proxy_count * template_count;
                    let last = state.last.map(|(p, t)| t * proxy_count + p);
                    let k = match last {
                        Some(last) if combos > 1 => {
                            let k = state.rng.random_range(0..combos - 1);
                            if k >= last {
                                k + 1
                            } else {
                                k
                            }
                        }
                        _ => state.rng.random_range(0..combos),
                    };
                    (k % proxy_count, k / proxy_count)
                }
            };
            state.last = Some(pair);
            pair
        };

        self.identity_at(proxy_idx, template_idx)
    }

    fn identity_at(&self, proxy_idx: usize, template_idx: usize) -> Identity {
        let mut headers = self.base_headers.clone();
        if let Some(template) = self.templates.get(template_idx) {
            headers.insert("user-agent".to_string(), template.user_agent.clone());
            if let Some(referer) = &template.referer {
                headers.insert("referer".to_string(), referer.clone());
            }
        }

        Identity {
            proxy: self.proxies.get(proxy_idx).cloned(),
            headers,
            template: template_idx,
        }
    }
}
