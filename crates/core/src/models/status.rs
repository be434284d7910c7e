use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SchedulerError;

/// 状态枚举以小写文本形式存入SQLite，并与JSON表示保持一致
macro_rules! text_status {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = SchedulerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    _ => Err(SchedulerError::Validation(format!(
                        "无效的{}: {s}",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <str as sqlx::Type<sqlx::Sqlite>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                s.parse::<$name>().map_err(|e| e.to_string().into())
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
            }
        }
    };
}

/// Taskset状态: pending → running → {finished, failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TasksetStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

text_status!(TasksetStatus {
    Pending => "pending",
    Running => "running",
    Finished => "finished",
    Failed => "failed",
});

impl TasksetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TasksetStatus::Finished | TasksetStatus::Failed)
    }
}

/// Task状态: pending → running → {passed, pending(重新入队), failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

text_status!(TaskStatus {
    Pending => "pending",
    Running => "running",
    Passed => "passed",
    Failed => "failed",
});

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Passed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Running,
    Passed,
    Failed,
    Error,
}

text_status!(TrialStatus {
    Running => "running",
    Passed => "passed",
    Failed => "failed",
    Error => "error",
});

impl TrialStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, TrialStatus::Running)
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, TrialStatus::Passed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlaveStatus {
    Idle,
    Running,
    Finished,
}

text_status!(SlaveStatus {
    Idle => "idle",
    Running => "running",
    Finished => "finished",
});
