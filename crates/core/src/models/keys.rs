use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

entity_key!(
    /// `rrrspec:taskset:<uuid>`
    TasksetKey
);
entity_key!(
    /// `<taskset key>:task:<spec_file>`
    TaskKey
);
entity_key!(
    /// `<task key>:trial:<uuid>`
    TrialKey
);
entity_key!(
    /// `rrrspec:worker:<name>`
    WorkerKey
);
entity_key!(
    /// `<worker key>:slave:<name>:<uuid>`
    SlaveKey
);
entity_key!(
    /// `<worker key>:worker_log:<uuid>`
    WorkerLogKey
);

fn short_uuid() -> String {
    Uuid::new_v4().simple().to_string()
}

impl TasksetKey {
    pub fn generate() -> Self {
        Self(format!("rrrspec:taskset:{}", short_uuid()))
    }
}

impl TaskKey {
    pub fn for_spec(taskset: &TasksetKey, spec_file: &str) -> Self {
        Self(format!("{taskset}:task:{spec_file}"))
    }
}

impl TrialKey {
    pub fn generate(task: &TaskKey) -> Self {
        Self(format!("{task}:trial:{}", short_uuid()))
    }
}

impl WorkerKey {
    pub fn from_name(name: &str) -> Self {
        Self(format!("rrrspec:worker:{name}"))
    }
}

impl SlaveKey {
    pub fn generate(worker: &WorkerKey, name: &str) -> Self {
        Self(format!("{worker}:slave:{name}:{}", short_uuid()))
    }
}

impl WorkerLogKey {
    pub fn generate(worker: &WorkerKey) -> Self {
        Self(format!("{worker}:worker_log:{}", short_uuid()))
    }
}

/// 日志文件名用的key：`/` 与 `:` 替换为 `_`
pub fn sanitize_for_filename(key: &str) -> String {
    key.replace(['/', ':'], "_")
}

/// API缓存文件名用的key：`:` 替换为 `-`
pub fn sanitize_for_cache(key: &str) -> String {
    key.replace(':', "-")
}
