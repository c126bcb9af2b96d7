use crate::{error::Result, io::progress::emit_download_progress};
use anyhow::Context;
use reqwest::blocking::Client;
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::Path,
    time::Duration,
};

pub fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60 * 60))
        .user_agent(concat!("stem-splitter/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Streams `url` into `dest` through a sibling `.part` file, reporting
/// progress. `dest` is only replaced once the whole body has arrived; a failed
/// transfer leaves no `.part` file behind.
pub fn download_with_progress(client: &Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    let part = dest.with_extension("part");

    let resp = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("downloading model artifact {url}"))?;

    let total = resp.content_length().unwrap_or(0);
    emit_download_progress(0, total);

    let downloaded = match stream_to(resp, &part, total) {
        Ok(n) => n,
        Err(e) => {
            fs::remove_file(&part).ok();
            return Err(e.context(format!("downloading model artifact {url}")));
        }
    };

    if dest.exists() {
        fs::remove_file(dest)
            .with_context(|| format!("removing stale model file {}", dest.display()))?;
    }
    fs::rename(&part, dest).with_context(|| {
        format!("moving {} into place at {}", part.display(), dest.display())
    })?;

    emit_download_progress(total.max(downloaded), total.max(downloaded));
    Ok(())
}

fn stream_to(mut body: impl Read, part: &Path, total: u64) -> anyhow::Result<u64> {
    let mut file =
        File::create(part).with_context(|| format!("creating {}", part.display()))?;

    let mut downloaded: u64 = 0;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = body.read(&mut buf).context("reading response body")?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .with_context(|| format!("writing {}", part.display()))?;
        downloaded += n as u64;
        emit_download_progress(downloaded, total);
    }
    file.flush()
        .with_context(|| format!("flushing {}", part.display()))?;

    Ok(downloaded)
}
