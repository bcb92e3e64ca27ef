use clap::{Args, Subcommand};
use resync_core::{Document, StoreError};
use serde::Deserialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db::{init_db, SqliteDocumentStore};

/// Manage the local resume library
#[derive(Debug, Args)]
pub struct DocCommand {
    #[command(subcommand)]
    pub command: DocSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum DocSubcommand {
    /// List local documents, most recently modified first
    List,

    /// Import documents from a JSON file (one document or an array)
    Import {
        /// File to read
        file: PathBuf,
    },

    /// Export documents to a JSON file
    Export {
        /// File to write
        file: PathBuf,

        /// Export only this document
        #[arg(long)]
        id: Option<String>,
    },

    /// Remove a local document
    Remove {
        /// Document id
        id: String,

        /// Skip confirmation
        #[arg(long, short)]
        force: bool,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Many(Vec<Document>),
    One(Box<Document>),
}

impl ImportFile {
    fn into_documents(self) -> Vec<Document> {
        match self {
            ImportFile::Many(documents) => documents,
            ImportFile::One(document) => vec![*document],
        }
    }
}

impl DocCommand {
    pub fn run(&self, config: &Config) -> Result<(), DocError> {
        let rt = tokio::runtime::Runtime::new().map_err(|e| DocError::Runtime(e.to_string()))?;

        rt.block_on(async {
            let pool = init_db(&config.database_path.value).await?;
            let store = SqliteDocumentStore::new(pool);
            self.execute(&store).await
        })
    }

    async fn execute(&self, store: &SqliteDocumentStore) -> Result<(), DocError> {
        match &self.command {
            DocSubcommand::List => {
                let documents = store.list().await?;
                if documents.is_empty() {
                    println!("No documents.");
                    return Ok(());
                }
                for document in &documents {
                    println!("{}", document);
                }
                println!();
                println!("{} document(s)", documents.len());
                Ok(())
            }

            DocSubcommand::Import { file } => {
                let documents = read_import(file)?;
                for document in &documents {
                    store.upsert(document).await?;
                }
                println!("Imported {} document(s) from {}", documents.len(), file.display());
                Ok(())
            }

            DocSubcommand::Export { file, id } => {
                let documents = match id {
                    Some(id) => vec![store
                        .get(id)
                        .await?
                        .ok_or_else(|| DocError::NotFound(id.clone()))?],
                    None => store.list().await?,
                };

                let json = serde_json::to_string_pretty(&documents)
                    .map_err(|e| DocError::Parse(file.clone(), e))?;
                std::fs::write(file, json).map_err(|e| DocError::Io(file.clone(), e))?;
                println!("Exported {} document(s) to {}", documents.len(), file.display());
                Ok(())
            }

            DocSubcommand::Remove { id, force } => {
                let document = store
                    .get(id)
                    .await?
                    .ok_or_else(|| DocError::NotFound(id.clone()))?;

                if !force && !confirm(&format!("Remove '{}'?", document.title))? {
                    println!("Removal cancelled.");
                    return Ok(());
                }

                store.delete(id).await?;
                println!("Removed document: {}", document.id);
                Ok(())
            }
        }
    }
}

fn read_import(file: &Path) -> Result<Vec<Document>, DocError> {
    let contents =
        std::fs::read_to_string(file).map_err(|e| DocError::Io(file.to_path_buf(), e))?;
    let parsed: ImportFile =
        serde_json::from_str(&contents).map_err(|e| DocError::Parse(file.to_path_buf(), e))?;
    Ok(parsed.into_documents())
}

fn confirm(prompt: &str) -> Result<bool, DocError> {
    print!("{} [y/N] ", prompt);
    io::stdout()
        .flush()
        .map_err(|e| DocError::Io(PathBuf::from("<stdout>"), e))?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| DocError::Io(PathBuf::from("<stdin>"), e))?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Errors from document commands
#[derive(Debug)]
pub enum DocError {
    Database(sqlx::Error),
    Store(StoreError),
    Io(PathBuf, io::Error),
    Parse(PathBuf, serde_json::Error),
    NotFound(String),
    Runtime(String),
}

impl std::fmt::Display for DocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocError::Database(e) => write!(f, "Database error: {}", e),
            DocError::Store(e) => write!(f, "{}", e),
            DocError::Io(path, e) => write!(f, "Failed to access '{}': {}", path.display(), e),
            DocError::Parse(path, e) => {
                write!(f, "Invalid document JSON in '{}': {}", path.display(), e)
            }
            DocError::NotFound(id) => write!(f, "Document not found: {}", id),
            DocError::Runtime(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for DocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocError::Database(e) => Some(e),
            DocError::Store(e) => Some(e),
            DocError::Io(_, e) => Some(e),
            DocError::Parse(_, e) => Some(e),
            DocError::NotFound(_) | DocError::Runtime(_) => None,
        }
    }
}

impl From<sqlx::Error> for DocError {
    fn from(e: sqlx::Error) -> Self {
        DocError::Database(e)
    }
}

impl From<StoreError> for DocError {
    fn from(e: StoreError) -> Self {
        DocError::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resync_core::DocumentStore;
    use tempfile::TempDir;

    struct TestContext {
        store: SqliteDocumentStore,
        temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        TestContext {
            store: SqliteDocumentStore::new(pool),
            temp_dir,
        }
    }

    fn command(command: DocSubcommand) -> DocCommand {
        DocCommand { command }
    }

    #[tokio::test]
    async fn test_import_single_and_array() {
        let ctx = setup().await;
        let single = ctx.temp_dir.path().join("one.json");
        std::fs::write(
            &single,
            r#"{"id":"a","title":"One","lastModified":"2025-01-01T00:00:00Z","summary":"x"}"#,
        )
        .unwrap();
        let many = ctx.temp_dir.path().join("many.json");
        std::fs::write(
            &many,
            r#"[{"id":"b","title":"Two","lastModified":"2025-01-02T00:00:00Z"},
                {"id":"c","title":"Three","lastModified":"2025-01-03T00:00:00Z"}]"#,
        )
        .unwrap();

        command(DocSubcommand::Import { file: single })
            .execute(&ctx.store)
            .await
            .unwrap();
        command(DocSubcommand::Import { file: many })
            .execute(&ctx.store)
            .await
            .unwrap();

        let documents = ctx.store.load_all().await.unwrap();
        assert_eq!(documents.len(), 3);
        assert_eq!(documents[0].fields["summary"], "x");
    }

    #[tokio::test]
    async fn test_import_invalid_json() {
        let ctx = setup().await;
        let file = ctx.temp_dir.path().join("bad.json");
        std::fs::write(&file, r#"{"title":"no id"}"#).unwrap();

        let result = command(DocSubcommand::Import { file })
            .execute(&ctx.store)
            .await;
        assert!(matches!(result, Err(DocError::Parse(_, _))));
    }

    #[tokio::test]
    async fn test_export_round_trips_through_import() {
        let ctx = setup().await;
        let document = Document::new("Staff Engineer").with_field("years", 12);
        ctx.store.upsert(&document).await.unwrap();

        let file = ctx.temp_dir.path().join("out.json");
        command(DocSubcommand::Export {
            file: file.clone(),
            id: Some(document.id.clone()),
        })
        .execute(&ctx.store)
        .await
        .unwrap();

        assert_eq!(read_import(&file).unwrap(), vec![document]);
    }

    #[tokio::test]
    async fn test_export_unknown_id() {
        let ctx = setup().await;
        let result = command(DocSubcommand::Export {
            file: ctx.temp_dir.path().join("out.json"),
            id: Some("missing".into()),
        })
        .execute(&ctx.store)
        .await;
        assert!(matches!(result, Err(DocError::NotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_remove_forced() {
        let ctx = setup().await;
        let document = Document::new("Temp");
        ctx.store.upsert(&document).await.unwrap();

        command(DocSubcommand::Remove {
            id: document.id.clone(),
            force: true,
        })
        .execute(&ctx.store)
        .await
        .unwrap();

        assert!(ctx.store.get(&document.id).await.unwrap().is_none());
    }
}
