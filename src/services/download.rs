use image::{DynamicImage, GenericImageView, ImageFormat};
use reqwest::Client;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::models::job::{Job, JobStatus};

const STEM_LEN: usize = 30;

/// Saves finished spritesheets and their frames to a local directory.
pub struct ResultDownloader {
    http: Client,
    out_dir: PathBuf,
}

impl ResultDownloader {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: Client::new(),
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Save the sheet of every finished job. A sheet that fails to download
    /// is logged and skipped.
    pub async fn download_sheets(&self, jobs: &[Job]) -> Result<Vec<PathBuf>, DownloadError> {
        tokio::fs::create_dir_all(&self.out_dir).await?;

        let mut written = Vec::new();
        let done = jobs.iter().filter(|j| j.status == JobStatus::Done);
        for (i, job) in done.enumerate() {
            let Some(result) = &job.result else { continue };
            let name = format!("spritesheet_{}_{}.png", file_stem(job.motion_prompt().unwrap_or_default()), i + 1);

            match self.fetch(&result.spritesheet_url).await {
                Ok(bytes) => {
                    let path = self.out_dir.join(name);
                    tokio::fs::write(&path, bytes).await?;
                    written.push(path);
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to download spritesheet");
                }
            }
        }

        tracing::info!(count = written.len(), dir = %self.out_dir.display(), "Spritesheets saved");
        Ok(written)
    }

    /// Save the individual frames of one finished job. Uses the frame URLs
    /// the service returned, or cuts the sheet up locally when it only
    /// reported a grid.
    pub async fn download_frames(&self, job: &Job) -> Result<Vec<PathBuf>, DownloadError> {
        let result = job.result.as_ref().ok_or(DownloadError::MissingResult(job.id))?;
        let stem = file_stem(job.motion_prompt().unwrap_or_default());
        tokio::fs::create_dir_all(&self.out_dir).await?;

        let mut written = Vec::new();

        if let Some(urls) = result.individual_frame_urls.as_ref().filter(|u| !u.is_empty()) {
            for (i, url) in urls.iter().enumerate() {
                let bytes = self.fetch(url).await?;
                let path = self.out_dir.join(format!("frame_{}_{}.png", stem, i + 1));
                tokio::fs::write(&path, bytes).await?;
                written.push(path);
            }
            return Ok(written);
        }

        let (cols, rows, frames) = result.grid().ok_or(DownloadError::MissingResult(job.id))?;
        let sheet = image::load_from_memory(&self.fetch(&result.spritesheet_url).await?)?;

        for (i, frame) in slice_spritesheet(&sheet, cols, rows, frames).iter().enumerate() {
            let mut png = Cursor::new(Vec::new());
            frame.write_to(&mut png, ImageFormat::Png)?;
            let path = self.out_dir.join(format!("frame_{}_{:02}.png", stem, i + 1));
            tokio::fs::write(&path, png.into_inner()).await?;
            written.push(path);
        }

        tracing::info!(job_id = %job.id, frames = written.len(), "Frames extracted from spritesheet");
        Ok(written)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Cut a sheet laid out as a `cols x rows` grid into at most `frames`
/// cells, row by row.
pub fn slice_spritesheet(sheet: &DynamicImage, cols: u32, rows: u32, frames: u32) -> Vec<DynamicImage> {
    if cols == 0 || rows == 0 {
        return Vec::new();
    }
    let (width, height) = sheet.dimensions();
    let (frame_w, frame_h) = (width / cols, height / rows);

    (0..rows)
        .flat_map(|row| (0..cols).map(move |col| (col, row)))
        .take(frames as usize)
        .map(|(col, row)| sheet.crop_imm(col * frame_w, row * frame_h, frame_w, frame_h))
        .collect()
}

/// File-name friendly form of a motion prompt.
pub fn file_stem(prompt: &str) -> String {
    prompt
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(STEM_LEN)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Job {0} has no frame data to download")]
    MissingResult(uuid::Uuid),
}
