//! User-chosen conflict resolution.

use chrono::Utc;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::Document;

/// Suffix appended to the title of a duplicated local document.
pub const CONFLICT_COPY_SUFFIX: &str = " (conflict copy)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Discard local changes and take the remote set.
    UseCloud,
    /// Overwrite the remote with the local set.
    KeepLocal,
    /// Keep the remote set plus a relabeled copy of every local document.
    KeepBoth,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictStrategy::UseCloud => write!(f, "use-cloud"),
            ConflictStrategy::KeepLocal => write!(f, "keep-local"),
            ConflictStrategy::KeepBoth => write!(f, "keep-both"),
        }
    }
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cloud" | "use-cloud" | "remote" => Ok(ConflictStrategy::UseCloud),
            "local" | "keep-local" => Ok(ConflictStrategy::KeepLocal),
            "both" | "keep-both" => Ok(ConflictStrategy::KeepBoth),
            _ => Err(format!(
                "Invalid conflict strategy: {}. Valid: cloud, local, both",
                s
            )),
        }
    }
}

/// Outcome of applying a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// New local document set.
    pub documents: Vec<Document>,
    /// Whether the result must be written to the remote.
    pub upload: bool,
}

pub fn resolve(strategy: ConflictStrategy, local: &[Document], remote: &[Document]) -> Resolution {
    match strategy {
        ConflictStrategy::UseCloud => Resolution {
            documents: remote.to_vec(),
            upload: false,
        },
        ConflictStrategy::KeepLocal => Resolution {
            documents: local.to_vec(),
            upload: true,
        },
        ConflictStrategy::KeepBoth => {
            let mut documents = remote.to_vec();
            documents.extend(local.iter().map(conflict_copy));
            Resolution {
                documents,
                upload: true,
            }
        }
    }
}

/// Duplicate `doc` under a fresh id with a relabeled title.
fn conflict_copy(doc: &Document) -> Document {
    let mut copy = doc.clone();
    copy.id = Uuid::new_v4().to_string();
    copy.title = format!("{}{}", doc.title, CONFLICT_COPY_SUFFIX)
        .trim_start()
        .to_string();
    copy.last_modified = Utc::now();
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn set(prefix: &str, n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| {
                Document::new(format!("{} {}", prefix, i))
                    .with_id(format!("{}-{}", prefix, i))
                    .with_field("summary", format!("{} summary", prefix))
            })
            .collect()
    }

    #[test]
    fn test_use_cloud_takes_remote() {
        let local = set("local", 3);
        let remote = set("remote", 2);
        let resolution = resolve(ConflictStrategy::UseCloud, &local, &remote);
        assert_eq!(resolution.documents, remote);
        assert!(!resolution.upload);
    }

    #[test]
    fn test_keep_local_takes_local() {
        let local = set("local", 3);
        let remote = set("remote", 2);
        let resolution = resolve(ConflictStrategy::KeepLocal, &local, &remote);
        assert_eq!(resolution.documents, local);
        assert!(resolution.upload);
    }

    #[test]
    fn test_keep_both_counts_and_relabels() {
        let local = set("local", 3);
        let remote = set("remote", 2);
        let resolution = resolve(ConflictStrategy::KeepBoth, &local, &remote);

        assert_eq!(resolution.documents.len(), 5);
        assert!(resolution.upload);
        assert_eq!(&resolution.documents[..2], &remote[..]);

        let copies = &resolution.documents[2..];
        for (copy, original) in copies.iter().zip(&local) {
            assert_ne!(copy.id, original.id);
            assert_eq!(copy.title, format!("{} (conflict copy)", original.title));
            assert_eq!(copy.fields, original.fields);
        }

        let ids: HashSet<_> = resolution.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_keep_both_untitled_copy() {
        let local = vec![Document::new("")];
        let resolution = resolve(ConflictStrategy::KeepBoth, &local, &[]);
        assert_eq!(resolution.documents[0].title, "(conflict copy)");
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("cloud".parse::<ConflictStrategy>().unwrap(), ConflictStrategy::UseCloud);
        assert_eq!("Keep-Local".parse::<ConflictStrategy>().unwrap(), ConflictStrategy::KeepLocal);
        assert_eq!("both".parse::<ConflictStrategy>().unwrap(), ConflictStrategy::KeepBoth);
        assert!("merge".parse::<ConflictStrategy>().is_err());
        assert_eq!(ConflictStrategy::KeepBoth.to_string(), "keep-both");
    }
}
