//! Provider configuration and wait timings.

use std::collections::HashMap;
use std::time::Duration;

/// API families the factory hands out clients for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCategory {
    ContainerInfra,
    Database,
    BlockStorage,
}

impl ServiceCategory {
    fn default_endpoint(&self) -> &'static str {
        match self {
            ServiceCategory::ContainerInfra => "https://infra.{region}.mcs.mail.ru/infra/container/v1",
            ServiceCategory::Database => "https://{region}.dbaas.mcs.mail.ru/v1.0/{project_id}",
            ServiceCategory::BlockStorage => "https://public.infra.mail.ru:8776/v3/{project_id}",
        }
    }
}

/// Read-only settings shared by every operation.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub region: String,
    pub token: String,
    pub project_id: String,
    /// Endpoint templates with `{region}` and `{project_id}` placeholders.
    pub endpoints: HashMap<ServiceCategory, String>,
    /// Retries for idempotent GETs answered with 500, 503 or 504.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    pub fn new(
        region: impl Into<String>,
        token: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            token: token.into(),
            project_id: project_id.into(),
            endpoints: HashMap::new(),
            max_retries: 3,
            retry_delay: Duration::from_millis(30),
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_endpoint(mut self, category: ServiceCategory, template: impl Into<String>) -> Self {
        self.endpoints.insert(category, template.into());
        self
    }

    /// Base URL for a category with placeholders filled in.
    pub fn endpoint(&self, category: ServiceCategory) -> String {
        let template = self
            .endpoints
            .get(&category)
            .map(String::as_str)
            .unwrap_or_else(|| category.default_endpoint());
        template
            .replace("{region}", &self.region)
            .replace("{project_id}", &self.project_id)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Timing of one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTiming {
    pub timeout: Duration,
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    pub min_poll_interval: Duration,
}

impl WaitTiming {
    pub const fn new(timeout: Duration, initial_delay: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            initial_delay,
            poll_interval,
            min_poll_interval: poll_interval,
        }
    }

    pub const fn with_min_poll_interval(mut self, min: Duration) -> Self {
        self.min_poll_interval = min;
        self
    }
}

const fn mins(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

const fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Per-kind create/update/delete timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindTimeouts {
    pub create: WaitTiming,
    pub update: WaitTiming,
    pub delete: WaitTiming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub compute_cluster: KindTimeouts,
    pub node_group: KindTimeouts,
    pub dbms: KindTimeouts,
    /// Databases and users share one budget.
    pub dbms_entity: KindTimeouts,
    pub volume: KindTimeouts,
    pub snapshot: KindTimeouts,
}

impl Default for Timeouts {
    fn default() -> Self {
        let dbms_wait =
            |timeout| WaitTiming::new(timeout, secs(10), secs(3)).with_min_poll_interval(secs(3));
        let storage = |timeout| WaitTiming::new(timeout, secs(10), secs(3));
        Self {
            compute_cluster: KindTimeouts {
                create: WaitTiming::new(mins(60), mins(1), secs(20)),
                update: WaitTiming::new(mins(60), mins(1), secs(20)),
                delete: WaitTiming::new(mins(30), secs(30), secs(10)),
            },
            node_group: KindTimeouts {
                create: WaitTiming::new(mins(60), mins(1), secs(20)),
                update: WaitTiming::new(mins(60), mins(1), secs(20)),
                delete: WaitTiming::new(mins(30), secs(10), secs(10)),
            },
            dbms: KindTimeouts {
                create: dbms_wait(mins(30)),
                update: dbms_wait(mins(30)),
                delete: dbms_wait(mins(30)),
            },
            dbms_entity: KindTimeouts {
                create: dbms_wait(mins(10)),
                update: dbms_wait(mins(10)),
                delete: dbms_wait(mins(10)),
            },
            volume: KindTimeouts {
                create: storage(mins(30)),
                update: storage(mins(30)),
                delete: storage(mins(30)),
            },
            snapshot: KindTimeouts {
                create: storage(mins(30)),
                update: storage(mins(30)),
                delete: storage(mins(30)),
            },
        }
    }
}

impl Timeouts {
    /// Every timing collapsed to `timeout` with no delays. For fakes and tests.
    pub fn immediate(timeout: Duration) -> Self {
        let t = WaitTiming::new(timeout, Duration::ZERO, Duration::ZERO);
        let k = KindTimeouts {
            create: t,
            update: t,
            delete: t,
        };
        Self {
            compute_cluster: k,
            node_group: k,
            dbms: k,
            dbms_entity: k,
            volume: k,
            snapshot: k,
        }
    }
}
