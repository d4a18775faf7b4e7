//! Domain vocabulary shared by every crate: platforms, collection kinds and
//! the status enums persisted as text columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// variants map one-to-one onto lowercase text values.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Text form as stored in the database and used on the wire.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(CoreError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Third-party advertising platform an integration talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Google,
    Meta,
    Naver,
}

text_enum!(Platform, "platform", {
    Google => "google",
    Meta => "meta",
    Naver => "naver",
});

impl Platform {
    /// Collection stages run by an initial backfill, in dependency order.
    ///
    /// Each stage after the first may only be claimed once the previous
    /// stage's job is terminal.
    #[must_use]
    pub fn initial_stages(self) -> &'static [CollectionType] {
        match self {
            Platform::Meta => &[
                CollectionType::Ads,
                CollectionType::Demographics,
                CollectionType::Creatives,
            ],
            Platform::Google | Platform::Naver => &[CollectionType::Ads],
        }
    }
}

/// How an integration authenticates. Immutable once the integration exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationType {
    Token,
    OAuth,
}

text_enum!(IntegrationType, "integration_type", {
    Token => "token",
    OAuth => "oauth",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Active,
    Expired,
    Error,
    Inactive,
}

text_enum!(IntegrationStatus, "integration_status", {
    Active => "active",
    Expired => "expired",
    Error => "error",
    Inactive => "inactive",
});

/// Summary of the integration's most recent collection activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCollectionStatus {
    Idle,
    Collecting,
    Completed,
    Partial,
    Error,
}

text_enum!(DataCollectionStatus, "data_collection_status", {
    Idle => "idle",
    Collecting => "collecting",
    Completed => "completed",
    Partial => "partial",
    Error => "error",
});

impl From<JobStatus> for DataCollectionStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending | JobStatus::Running => DataCollectionStatus::Collecting,
            JobStatus::Completed => DataCollectionStatus::Completed,
            JobStatus::Partial => DataCollectionStatus::Partial,
            JobStatus::Failed => DataCollectionStatus::Error,
        }
    }
}

/// What a job collects. Each kind is fetched by a different platform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Ads,
    Demographics,
    Creatives,
}

text_enum!(CollectionType, "collection_type", {
    Ads => "ads",
    Demographics => "demographics",
    Creatives => "creatives",
});

/// Whether a job is a historical backfill or a routine daily pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMode {
    Initial,
    Daily,
    Manual,
}

text_enum!(CollectionMode, "collection_mode", {
    Initial => "initial",
    Daily => "daily",
    Manual => "manual",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
}

text_enum!(JobStatus, "job_status", {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Partial => "partial",
    Failed => "failed",
});

impl JobStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Failed
        )
    }
}

/// Chunk lifecycle. `Completed` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Completed,
    Failed,
}

text_enum!(ChunkStatus, "chunk_status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Completed,
    Expired,
    Failed,
}

text_enum!(SessionStatus, "session_status", {
    Pending => "pending",
    Completed => "completed",
    Expired => "expired",
    Failed => "failed",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_text() {
        for platform in [Platform::Google, Platform::Meta, Platform::Naver] {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = "tiktok".parse::<Platform>().unwrap_err();
        assert!(
            matches!(err, CoreError::UnknownVariant { kind: "platform", ref value } if value == "tiktok")
        );
    }

    #[test]
    fn meta_runs_three_dependent_stages() {
        assert_eq!(
            Platform::Meta.initial_stages(),
            &[
                CollectionType::Ads,
                CollectionType::Demographics,
                CollectionType::Creatives
            ]
        );
        assert_eq!(Platform::Google.initial_stages(), &[CollectionType::Ads]);
        assert_eq!(Platform::Naver.initial_stages(), &[CollectionType::Ads]);
    }

    #[test]
    fn oauth_serializes_lowercase() {
        let json = serde_json::to_string(&IntegrationType::OAuth).expect("serialize");
        assert_eq!(json, "\"oauth\"");
        assert_eq!(IntegrationType::OAuth.as_str(), "oauth");
    }

    #[test]
    fn job_status_rolls_up_to_collection_status() {
        assert_eq!(
            DataCollectionStatus::from(JobStatus::Completed),
            DataCollectionStatus::Completed
        );
        assert_eq!(
            DataCollectionStatus::from(JobStatus::Partial),
            DataCollectionStatus::Partial
        );
        assert_eq!(
            DataCollectionStatus::from(JobStatus::Failed),
            DataCollectionStatus::Error
        );
        assert_eq!(
            DataCollectionStatus::from(JobStatus::Running),
            DataCollectionStatus::Collecting
        );
    }

    #[test]
    fn only_completed_partial_failed_are_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Partial.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
