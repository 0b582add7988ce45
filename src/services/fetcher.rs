use crate::error::{Result, SegmenterError};
use crate::types::{Page, PageId, SourceMetadata, SourceType};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};
use url::Url;
use walkdir::WalkDir;

/// Page files accept either a bare array or `{ "pages": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PageFile {
    Bare(Vec<Page>),
    Wrapped { pages: Vec<Page> },
}

pub struct PageSource;

impl PageSource {
    /// Loads pages from a JSON file, an http(s) URL, or a directory of `<id>.txt` files.
    pub async fn load_pages(source: &str) -> Result<(Vec<Page>, SourceMetadata)> {
        let path = Path::new(source);
        let (pages, source_type) = if !Self::is_url(source) && path.is_dir() {
            let dir = path.to_path_buf();
            let pages = tokio::task::spawn_blocking(move || Self::read_page_dir(&dir))
                .await
                .map_err(|e| anyhow::anyhow!("page directory task failed: {}", e))??;
            (pages, SourceType::Directory)
        } else {
            let (text, source_type) = Self::fetch_text(source).await?;
            let pages = match serde_json::from_str::<PageFile>(&text)? {
                PageFile::Bare(pages) | PageFile::Wrapped { pages } => pages,
            };
            (pages, source_type)
        };

        let metadata = SourceMetadata {
            source: source.to_string(),
            source_type,
            loaded_at: chrono::Utc::now().to_rfc3339(),
            page_count: pages.len(),
        };
        info!("Loaded {} pages from {}", pages.len(), source);

        Ok((pages, metadata))
    }

    /// Loads any JSON document (presets, existing excerpts) from a file or URL.
    pub async fn load_json<T: DeserializeOwned>(source: &str) -> Result<T> {
        let (text, _) = Self::fetch_text(source).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn fetch_text(source: &str) -> Result<(String, SourceType)> {
        if Self::is_url(source) {
            Ok((Self::fetch_from_url(source).await?, SourceType::Url))
        } else {
            Ok((Self::fetch_from_file(source).await?, SourceType::LocalFile))
        }
    }

    async fn fetch_from_url(url: &str) -> Result<String> {
        info!("Fetching content from URL: {}", url);

        Url::parse(url)?;
        let client = reqwest::Client::new();
        let response = client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(SegmenterError::HttpStatus {
                status: response.status().as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    async fn fetch_from_file(file_path: &str) -> Result<String> {
        let path = Path::new(file_path);

        if !path.exists() {
            return Err(SegmenterError::FileNotFound {
                path: file_path.to_string(),
            });
        }

        Ok(fs::read_to_string(path).await?)
    }

    fn read_page_dir(dir: &Path) -> Result<Vec<Page>> {
        let mut pages: Vec<Page> = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| SegmenterError::InvalidInput {
                reason: format!("cannot read {}: {}", dir.display(), e),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }

            let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<PageId>().ok())
            else {
                warn!("Skipping {}: file name is not a page id", path.display());
                continue;
            };

            pages.push(Page::new(id, std::fs::read_to_string(path)?));
        }

        if pages.is_empty() {
            return Err(SegmenterError::InvalidInput {
                reason: format!("no <id>.txt page files in {}", dir.display()),
            });
        }

        pages.sort_by_key(|page| page.id);
        Ok(pages)
    }

    fn is_url(source: &str) -> bool {
        source.starts_with("http://") || source.starts_with("https://")
    }

    pub async fn validate_sources(sources: &[String]) -> Result<Vec<String>> {
        let mut validated = Vec::new();

        for source in sources {
            if Self::is_url(source) {
                Url::parse(source)?;
                validated.push(source.clone());
            } else if PathBuf::from(source).exists() {
                validated.push(source.clone());
            } else {
                return Err(SegmenterError::FileNotFound {
                    path: source.clone(),
                });
            }
        }

        Ok(validated)
    }
}
