use crate::error::{InstallError, InstallResult};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

const USER_AGENT: &str = concat!("relinst/", env!("CARGO_PKG_VERSION"));
// Content-Length is untrusted until the bytes are verified.
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

/// Fetch `url` into memory.
///
/// `file://` URLs are read from the local filesystem, which is how local
/// mirrors and test fixtures are served. Anything that is not a complete,
/// successful response is a network error.
pub async fn fetch(url: &str) -> InstallResult<Vec<u8>> {
    if let Some(path) = url.strip_prefix("file://") {
        tracing::info!("Reading {}...", path);
        return tokio::fs::read(Path::new(path))
            .await
            .map_err(|e| InstallError::network(url, e));
    }

    tracing::info!("Downloading {}...", url);

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| InstallError::network(url, e))?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| InstallError::network(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(InstallError::network(url, format!("HTTP {}", status)));
    }

    let total_size = response.content_length();
    let pb = progress_bar(url, total_size);

    let mut buf = Vec::with_capacity(total_size.map_or(0, |len| len.min(MAX_PREALLOC)) as usize);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            pb.abandon_with_message("Download failed");
            InstallError::network(url, e)
        })?;
        buf.extend_from_slice(&chunk);
        pb.set_position(buf.len() as u64);
    }

    if let Some(expected) = total_size {
        if buf.len() as u64 != expected {
            pb.abandon_with_message("Download truncated");
            return Err(InstallError::network(
                url,
                format!("truncated body: got {} of {} bytes", buf.len(), expected),
            ));
        }
    }

    pb.finish_with_message("Download complete");
    tracing::debug!("Fetched {} bytes from {}", buf.len(), url);
    Ok(buf)
}

fn progress_bar(url: &str, total_size: Option<u64>) -> ProgressBar {
    let filename = url
        .split(&['?', '#'][..])
        .next()
        .and_then(|u| u.rsplit('/').next())
        .unwrap_or(url)
        .to_string();

    let pb = match total_size {
        Some(len) => {
            let pb = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        }
        None => ProgressBar::new_spinner(),
    };
    pb.set_message(format!("Downloading {}", filename));
    pb
}
